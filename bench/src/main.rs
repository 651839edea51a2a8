use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use anyhow::Context as _;
use serde_json::json;

#[derive(Clone, Debug)]
struct BenchArgs {
    seed: u64,
    fps: u32,
    seconds: u32,
    warmup: u32,
    repeats: u32,
    lines: usize,
    with_draw: bool,
    out: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
struct RunMetrics {
    init: Duration,
    update_total: Duration,
    draw_total: Duration,
    wall_total: Duration,
    creatures: usize,
    tweets_requested: u64,
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> anyhow::Result<()> {
    let args = parse_args()?;

    if args.fps == 0 || args.seconds == 0 {
        anyhow::bail!("--fps and --seconds must be > 0");
    }
    if args.lines == 0 {
        anyhow::bail!("--lines must be >= 1");
    }

    let ticks = u64::from(args.fps) * u64::from(args.seconds);

    if args.warmup > 0 {
        eprintln!("warmup: {} run(s)", args.warmup);
        for i in 0..args.warmup {
            let _ = run_once(&args, ticks, i)?;
        }
    }

    eprintln!(
        "bench: {repeats} run(s) ({profile} build), {ticks} ticks/run ({seconds}s @ {fps} fps), lines={lines}, draw={draw}",
        repeats = args.repeats,
        profile = if cfg!(debug_assertions) {
            "debug"
        } else {
            "release"
        },
        seconds = args.seconds,
        fps = args.fps,
        lines = args.lines,
        draw = if args.with_draw { "yes" } else { "no" },
    );

    let mut runs = Vec::<RunMetrics>::with_capacity(args.repeats as usize);
    for i in 0..args.repeats {
        runs.push(run_once(&args, ticks, i)?);
    }

    report_percentiles(&runs);

    if let Some(out) = &args.out {
        write_report(out, &args, ticks, &runs)?;
    }
    Ok(())
}

fn run_once(args: &BenchArgs, ticks: u64, run: u32) -> anyhow::Result<RunMetrics> {
    let wall = Instant::now();
    let mut m = RunMetrics::default();

    let config = wirebirds::SceneConfig {
        line_count: args.lines,
        ..wirebirds::SceneConfig::default()
    };
    let rand = wirebirds::Rand::seeded(args.seed.wrapping_add(u64::from(run)));
    let mut scene = wirebirds::Scene::new(config, rand).context("build scene")?;

    let t0 = Instant::now();
    scene.init().context("init scene")?;
    m.init = t0.elapsed();
    m.creatures = scene.creature_count();

    let dt = 1.0 / f64::from(args.fps);
    for i in 1..=ticks {
        let t0 = Instant::now();
        scene
            .update(dt, i as f64 * dt)
            .with_context(|| format!("update tick {i}"))?;
        m.update_total += t0.elapsed();

        if args.with_draw {
            let t0 = Instant::now();
            let items = scene.draw_list();
            std::hint::black_box(items.len());
            m.draw_total += t0.elapsed();
        }
    }

    m.tweets_requested = scene.stats().tweets_requested;
    m.wall_total = wall.elapsed();
    Ok(m)
}

fn parse_args() -> anyhow::Result<BenchArgs> {
    let mut args = std::env::args().skip(1);

    let mut out = BenchArgs {
        seed: 1,
        fps: 60,
        seconds: 10,
        warmup: 1,
        repeats: 20,
        lines: 4,
        with_draw: false,
        out: None,
    };

    while let Some(a) = args.next() {
        match a.as_str() {
            "--seed" => out.seed = parse_u64(args.next(), "--seed")?,
            "--fps" => out.fps = parse_u32(args.next(), "--fps")?,
            "--seconds" => out.seconds = parse_u32(args.next(), "--seconds")?,
            "--warmup" => out.warmup = parse_u32(args.next(), "--warmup")?,
            "--repeats" => out.repeats = parse_u32(args.next(), "--repeats")?,
            "--lines" => out.lines = parse_u32(args.next(), "--lines")? as usize,
            "--draw" => out.with_draw = true,
            "--out" => {
                out.out = Some(PathBuf::from(args.next().ok_or_else(|| {
                    anyhow::anyhow!("missing value for --out (expected a path)")
                })?))
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => anyhow::bail!("unknown arg '{a}' (try --help)"),
        }
    }

    Ok(out)
}

fn print_help() {
    eprintln!(
        r#"wirebirds-bench

Steps a default scene repeatedly and reports p50/p90/p99 for init, update and draw.

Usage:
  cargo run -q --release
  cargo run -q --release -- --repeats 50 --seconds 10 --fps 60
  cargo run -q --release -- --draw --out target/bench.json

Args:
  --seed N       (default 1; run i uses seed + i)
  --fps N        (default 60)
  --seconds N    (default 10)
  --warmup N     (default 1)
  --repeats N    (default 20)
  --lines N      (default 4)
  --draw         also build the draw list every tick
  --out PATH     write a JSON report
"#
    );
}

fn parse_u32(v: Option<String>, flag: &str) -> anyhow::Result<u32> {
    let v = v.ok_or_else(|| anyhow::anyhow!("missing value for {flag}"))?;
    v.parse::<u32>()
        .with_context(|| format!("parse {flag} value '{v}'"))
}

fn parse_u64(v: Option<String>, flag: &str) -> anyhow::Result<u64> {
    let v = v.ok_or_else(|| anyhow::anyhow!("missing value for {flag}"))?;
    v.parse::<u64>()
        .with_context(|| format!("parse {flag} value '{v}'"))
}

type Getter = fn(&RunMetrics) -> Duration;

const FIELDS: &[(&str, Getter)] = &[
    ("init", |m| m.init),
    ("update_total", |m| m.update_total),
    ("draw_total", |m| m.draw_total),
    ("wall_total", |m| m.wall_total),
];

fn collect(runs: &[RunMetrics], f: Getter) -> Vec<Duration> {
    let mut v = runs.iter().map(f).collect::<Vec<_>>();
    v.sort_by_key(|d| d.as_nanos());
    v
}

fn percentile(v: &[Duration], p: f64) -> Duration {
    if v.is_empty() {
        return Duration::ZERO;
    }
    let n = v.len();
    let rank = (p * (n as f64)).ceil().clamp(1.0, n as f64) as usize;
    v[rank - 1]
}

fn fmt_ms(d: Duration) -> String {
    format!("{:.3}ms", d.as_secs_f64() * 1000.0)
}

fn report_percentiles(runs: &[RunMetrics]) {
    eprintln!("\npercentiles across runs (p50/p90/p99):");
    for (name, getter) in FIELDS {
        let v = collect(runs, *getter);
        eprintln!(
            "  {name:14} p50={p50:>10}  p90={p90:>10}  p99={p99:>10}",
            p50 = fmt_ms(percentile(&v, 0.50)),
            p90 = fmt_ms(percentile(&v, 0.90)),
            p99 = fmt_ms(percentile(&v, 0.99)),
        );
    }
    if let Some(first) = runs.first() {
        eprintln!(
            "  creatures={} tweets/run={}",
            first.creatures, first.tweets_requested
        );
    }
}

fn write_report(
    out: &Path,
    args: &BenchArgs,
    ticks: u64,
    runs: &[RunMetrics],
) -> anyhow::Result<()> {
    let mut stages = serde_json::Map::new();
    for (name, getter) in FIELDS {
        let v = collect(runs, *getter);
        stages.insert(
            (*name).to_string(),
            json!({
                "p50_ms": percentile(&v, 0.50).as_secs_f64() * 1000.0,
                "p90_ms": percentile(&v, 0.90).as_secs_f64() * 1000.0,
                "p99_ms": percentile(&v, 0.99).as_secs_f64() * 1000.0,
            }),
        );
    }
    let update = collect(runs, |m| m.update_total);
    let p50 = percentile(&update, 0.50).as_secs_f64();
    let ticks_per_sec = if p50 > 0.0 { ticks as f64 / p50 } else { 0.0 };

    let report = json!({
        "seed": args.seed,
        "fps": args.fps,
        "seconds": args.seconds,
        "repeats": args.repeats,
        "lines": args.lines,
        "draw": args.with_draw,
        "ticks_per_run": ticks,
        "ticks_per_sec_p50": ticks_per_sec,
        "stages": stages,
    });

    if let Some(dir) = out.parent()
        && !dir.as_os_str().is_empty()
    {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create report dir '{}'", dir.display()))?;
    }
    let text = serde_json::to_string_pretty(&report)?;
    std::fs::write(out, text).with_context(|| format!("write report '{}'", out.display()))?;
    eprintln!("report: {}", out.display());
    Ok(())
}
