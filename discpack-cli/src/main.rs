use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use globset::{Glob, GlobSet, GlobSetBuilder};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use discpack_core::archive::{next_free_archive, Archiver};
use discpack_core::config::PackConfig;
use discpack_core::pacing::SleepPacer;
use discpack_core::plan::{PackPlan, Planner};
use discpack_core::size::FsSizeQuery;
use discpack_core::split::SplitStrategy;

mod archiver;
mod logging;

use archiver::{extension_for, SevenZip};

const WRITE_CHUNK: usize = 1 << 20;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StrategyArg {
    Bisect,
    Halving,
}

impl From<StrategyArg> for SplitStrategy {
    fn from(s: StrategyArg) -> Self {
        match s {
            StrategyArg::Bisect => SplitStrategy::Bisect,
            StrategyArg::Halving => SplitStrategy::Halving,
        }
    }
}

#[derive(Parser)]
#[command(name = "discpack", version, about = "Pack files into capacity-bounded sets for disc archiving")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
    /// Log filter (overridden by RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,
    /// Append logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Show how the inputs would be packed
    Plan {
        #[command(flatten)]
        pack: PackArgs,
        /// Also write the plan as JSON
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// Pack the inputs and archive every set part
    Pack {
        #[command(flatten)]
        pack: PackArgs,
        /// Directory receiving the archives
        #[arg(long)]
        dest: PathBuf,
        #[arg(long, default_value = "7z")]
        archiver: PathBuf,
        #[arg(long)]
        password: Option<String>,
        #[arg(long, default_value = "0", value_parser = ["0", "1", "3", "5", "7", "9"])]
        compression: String,
        #[arg(long, default_value = "zip", value_parser = ["7z", "zip", "gzip", "bzip2", "tar"])]
        format: String,
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// Write random-sized test files
    Generate {
        #[arg(long)]
        dir: PathBuf,
        #[arg(long, default_value_t = 20)]
        count: usize,
        #[arg(long, default_value = "30M", value_parser = parse_size)]
        min_size: u64,
        #[arg(long, default_value = "1500M", value_parser = parse_size)]
        max_size: u64,
        #[arg(long, default_value = "15G", value_parser = parse_size)]
        total: u64,
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Args)]
struct PackArgs {
    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, value_parser = parse_size)]
    granularity: Option<u64>,
    /// Capacity every set stays under (e.g. 4.3G)
    #[arg(long, value_parser = parse_size)]
    capacity: Option<u64>,
    /// Ceiling for the split pass (e.g. 4G)
    #[arg(long, value_parser = parse_size)]
    secondary_capacity: Option<u64>,
    #[arg(long, default_value_t = false)]
    no_split: bool,
    #[arg(long, value_enum)]
    split_strategy: Option<StrategyArg>,
    /// Stop after N sets
    #[arg(long)]
    sets: Option<usize>,
    /// Delay between packer steps
    #[arg(long)]
    pace_ms: Option<u64>,
    #[arg(long, default_value_t = false)]
    no_recurse: bool,
    #[arg(long)]
    include: Vec<String>,
    #[arg(long)]
    exclude: Vec<String>,
    /// Succeed even when some files fit in no set
    #[arg(long, default_value_t = false)]
    allow_unpacked: bool,
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
}

fn main() -> Result<()> {
    let Cli { cmd, log_level, log_file } = Cli::parse();
    match cmd {
        Cmd::Plan { pack, json } => {
            let cfg = load_config(&pack, log_level, log_file)?;
            let plan = build_plan(&pack, &cfg)?;
            print_plan(&plan);
            write_json(&plan, json.as_deref())?;
            check_unpacked(&plan, pack.allow_unpacked)?;
        }
        Cmd::Pack { pack, dest, archiver, password, compression, format, json } => {
            if compression != "0" && format != "zip" {
                bail!("--compression is only supported with --format zip");
            }
            let cfg = load_config(&pack, log_level, log_file)?;
            let plan = build_plan(&pack, &cfg)?;
            print_plan(&plan);
            write_json(&plan, json.as_deref())?;
            check_unpacked(&plan, pack.allow_unpacked)?;
            let zipper = SevenZip { program: archiver, format, compression, password };
            archive_plan(&plan, &dest, &zipper, extension_for(&zipper.format))?;
        }
        Cmd::Generate { dir, count, min_size, max_size, total, seed } => {
            logging::init(log_level.as_deref().unwrap_or("info"), log_file.as_deref())?;
            let (files, bytes) = generate(&dir, count, min_size, max_size, total, seed)?;
            println!("Generated {} file(s), {} bytes under {}", files, bytes, dir.display());
        }
    }
    Ok(())
}

fn load_config(args: &PackArgs, log_level: Option<String>, log_file: Option<PathBuf>) -> Result<PackConfig> {
    let mut cfg = PackConfig::load(args.config.as_deref())
        .with_context(|| format!("load config {:?}", args.config))?;
    if let Some(level) = log_level {
        cfg.log.level = level;
    }
    if log_file.is_some() {
        cfg.log.file = log_file;
    }
    logging::init(&cfg.log.level, cfg.log.file.as_deref())?;

    let p = &mut cfg.pack;
    if let Some(v) = args.granularity { p.bucket_granularity = v; }
    if let Some(v) = args.capacity { p.primary_capacity = v; }
    if let Some(v) = args.secondary_capacity { p.secondary_capacity = v; }
    if args.no_split { p.split = false; }
    if let Some(s) = args.split_strategy { p.split_strategy = s.into(); }
    if args.sets.is_some() { p.max_sets = args.sets; }
    if let Some(v) = args.pace_ms { p.pace_ms = v; }
    cfg.validate()?;
    Ok(cfg)
}

fn build_plan(args: &PackArgs, cfg: &PackConfig) -> Result<PackPlan> {
    let (inc, exc) = build_globset(&args.include, &args.exclude)?;
    let files = list_files(&args.inputs, &inc, &exc, !args.no_recurse)?;
    info!(files = files.len(), "enumerated input files");

    let mut index = cfg.pack.new_index()?;
    for (path, size) in files {
        if !index.add(&path, size) {
            warn!(path = %path.display(), "listed twice, indexing once");
        }
    }
    let pacer = SleepPacer::from_millis(cfg.pack.pace_ms);
    let plan = Planner::new(&cfg.pack, &FsSizeQuery).with_pacer(&pacer).plan(index)?;
    Ok(plan)
}

fn build_globset(includes: &[String], excludes: &[String]) -> Result<(GlobSet, GlobSet)> {
    let mut incb = GlobSetBuilder::new();
    let mut excb = GlobSetBuilder::new();
    if includes.is_empty() { incb.add(Glob::new("**/*")?); }
    for g in includes { incb.add(Glob::new(g).with_context(|| format!("bad include glob {}", g))?); }
    for g in excludes { excb.add(Glob::new(g).with_context(|| format!("bad exclude glob {}", g))?); }
    Ok((incb.build()?, excb.build()?))
}

/// Regular files under `inputs` with their sizes, sorted by path. Paths that
/// resolve to the same file (`data` and `./data`) are listed once.
fn list_files(inputs: &[PathBuf], inc: &GlobSet, exc: &GlobSet, recurse: bool) -> Result<Vec<(PathBuf, u64)>> {
    let cwd = std::env::current_dir()?;
    let mut v = vec![];
    for p in inputs {
        let md = fs::metadata(p).with_context(|| format!("stat {}", p.display()))?;
        if md.is_dir() {
            let walker = WalkDir::new(p).min_depth(1).max_depth(if recurse { usize::MAX } else { 1 });
            for e in walker.into_iter().filter_map(|e| e.ok()) {
                if !e.file_type().is_file() { continue; }
                let path = e.path();
                let rp = pathdiff::diff_paths(path, &cwd).unwrap_or_else(|| path.to_path_buf());
                let rp_str = rp.to_string_lossy().replace('\\', "/");
                if !inc.is_match(&rp_str) { continue; }
                if !exc.is_match(&rp_str) { v.push(path.to_path_buf()); }
            }
        } else if md.is_file() {
            v.push(p.clone());
        }
    }
    v.sort();
    let mut seen = HashSet::new();
    v.retain(|p| seen.insert(fs::canonicalize(p).unwrap_or_else(|_| p.clone())));
    v.into_par_iter()
        .map(|p| -> Result<(PathBuf, u64)> {
            let len = fs::metadata(&p).with_context(|| format!("stat {}", p.display()))?.len();
            Ok((p, len))
        })
        .collect()
}

/// Parse `1234`, `64K`, `100M`, `4.3G`, `2TiB`, ... into bytes (binary multiples).
fn parse_size(spec: &str) -> std::result::Result<u64, String> {
    let s = spec.trim().to_uppercase();
    let s = s.strip_suffix("IB").or_else(|| s.strip_suffix('B')).unwrap_or(&s);
    let (num, mul) = if let Some(n) = s.strip_suffix('K') { (n, 1u64 << 10) }
        else if let Some(n) = s.strip_suffix('M') { (n, 1 << 20) }
        else if let Some(n) = s.strip_suffix('G') { (n, 1 << 30) }
        else if let Some(n) = s.strip_suffix('T') { (n, 1 << 40) }
        else { (s, 1) };
    let num = num.trim();
    if num.contains('.') {
        let v: f64 = num.parse().map_err(|_| format!("bad size {}", spec))?;
        if !v.is_finite() || v < 0.0 { return Err(format!("bad size {}", spec)); }
        let bytes = v * mul as f64;
        if bytes >= u64::MAX as f64 { return Err(format!("size {} overflows", spec)); }
        Ok(bytes as u64)
    } else {
        let v: u64 = num.parse().map_err(|_| format!("bad size {}", spec))?;
        v.checked_mul(mul).ok_or_else(|| format!("size {} overflows", spec))
    }
}

fn print_plan(plan: &PackPlan) {
    for (set, part, files) in plan.parts() {
        println!("Fileset #{}-{}:", set, part);
        print!("{}", files);
    }
    for s in &plan.skipped {
        println!("Skipped: {} ({})", s.path.display(), s.reason);
    }
    for u in &plan.unpacked {
        println!("Unpacked: {} ({} bytes, {:?})", u.path.display(), u.size, u.reason);
    }
    println!(
        "Sets: {}, parts: {}, packed {} of {} bytes",
        plan.sets.len(),
        plan.part_count(),
        plan.packed_bytes(),
        plan.input_bytes
    );
}

fn write_json(plan: &PackPlan, path: Option<&Path>) -> Result<()> {
    let Some(path) = path else { return Ok(()) };
    let mut f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    f.write_all(plan.to_json_pretty()?.as_bytes())?;
    Ok(())
}

/// Skipped and unpacked files both end up in no set.
fn check_unpacked(plan: &PackPlan, allow: bool) -> Result<()> {
    let missing = plan.unpacked.len() + plan.skipped.len();
    if missing == 0 || allow {
        return Ok(());
    }
    Err(anyhow!("{} file(s) could not be packed (use --allow-unpacked to continue)", missing))
}

fn archive_plan(plan: &PackPlan, dest: &Path, archiver: &dyn Archiver, ext: &str) -> Result<()> {
    fs::create_dir_all(dest).with_context(|| format!("create dir {}", dest.display()))?;
    let mut ctr = 1usize;
    let mut failed = 0usize;
    for set in &plan.sets {
        for (i, part) in set.parts.iter().enumerate() {
            let (name, n) = next_free_archive(dest, ctr, i + 1, ext);
            ctr = n;
            let report = archiver
                .archive(&name, &part.file_names())
                .with_context(|| format!("run archiver for {}", name.display()))?;
            if report.success {
                println!("{}: OK", name.display());
            } else {
                failed += 1;
                println!("{}: FAILED", name.display());
                eprintln!("{}", report.output);
            }
        }
        ctr += 1;
    }
    if failed > 0 {
        bail!("{} archive(s) failed", failed);
    }
    Ok(())
}

fn generate(dir: &Path, count: usize, min_size: u64, max_size: u64, total: u64, seed: Option<u64>) -> Result<(usize, u64)> {
    if min_size > max_size {
        bail!("--min-size must not exceed --max-size");
    }
    fs::create_dir_all(dir).with_context(|| format!("create dir {}", dir.display()))?;
    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    let mut left = total;
    let mut written = 0usize;
    for n in 1..=count {
        let hi = max_size.min(left);
        let lo = min_size.min(left);
        let size = if lo == hi { lo } else { rng.gen_range(lo..hi) };
        if size == 0 {
            break;
        }
        let path = dir.join(format!("testFile{}.dat", n));
        write_filler(&path, size)?;
        info!(path = %path.display(), size, "generated test file");
        left -= size;
        written += 1;
    }
    if left > 0 && written == count {
        warn!(left, "file count reached before the total size");
    }
    Ok((written, total - left))
}

/// Fill `path` with `size` bytes of '1's, one newline per megabyte.
fn write_filler(path: &Path, size: u64) -> Result<()> {
    let mut line = vec![b'1'; WRITE_CHUNK];
    line[WRITE_CHUNK - 1] = b'\n';
    let mut out = BufWriter::new(File::create(path).with_context(|| format!("create {}", path.display()))?);
    let mut remaining = size;
    while remaining > WRITE_CHUNK as u64 {
        out.write_all(&line)?;
        remaining -= WRITE_CHUNK as u64;
    }
    let tail = remaining as usize;
    if tail > 0 {
        out.write_all(&line[WRITE_CHUNK - tail..])?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use discpack_core::packer::{SkipReason, SkippedEntry};
    use discpack_core::plan::{UnpackedEntry, UnpackedReason};

    #[test]
    fn sizes_with_suffixes() {
        assert_eq!(parse_size("1234").unwrap(), 1234);
        assert_eq!(parse_size("64k").unwrap(), 64 * 1024);
        assert_eq!(parse_size("100M").unwrap(), 100 * 1024 * 1024);
        assert_eq!(parse_size("100MB").unwrap(), 100 * 1024 * 1024);
        assert_eq!(parse_size("4GiB").unwrap(), 4 << 30);
        assert_eq!(parse_size("4.3G").unwrap(), 4_617_089_843);
        assert!(parse_size("abc").is_err());
        assert!(parse_size("-1").is_err());
        assert!(parse_size("99999999999T").is_err());
        assert!(parse_size("99999999999.5T").is_err());
        assert!(parse_size("16777216.0T").is_err());
        assert_eq!(parse_size("0.5K").unwrap(), 512);
    }

    fn plan_with(skipped: Vec<SkippedEntry>, unpacked: Vec<UnpackedEntry>) -> PackPlan {
        PackPlan {
            created_utc: String::new(),
            bucket_granularity: 100,
            primary_capacity: 1000,
            secondary_capacity: None,
            input_files: skipped.len() + unpacked.len(),
            input_bytes: 0,
            sets: Vec::new(),
            skipped,
            unpacked,
        }
    }

    #[test]
    fn skipped_files_fail_the_run_unless_allowed() {
        let skipped = vec![SkippedEntry {
            path: PathBuf::from("gone.bin"),
            bucket: 0,
            size: 0,
            reason: SkipReason::QueryFailed { message: "not found".into() },
        }];
        let err = check_unpacked(&plan_with(skipped.clone(), Vec::new()), false).unwrap_err();
        assert!(err.to_string().starts_with("1 file(s) could not be packed"));
        assert!(check_unpacked(&plan_with(skipped, Vec::new()), true).is_ok());
    }

    #[test]
    fn skipped_and_unpacked_are_counted_together() {
        let skipped = vec![SkippedEntry {
            path: PathBuf::from("neg.bin"),
            bucket: 0,
            size: 5,
            reason: SkipReason::NegativeSize { reported: -1 },
        }];
        let unpacked = vec![UnpackedEntry {
            path: PathBuf::from("huge.bin"),
            size: 5000,
            reason: UnpackedReason::TooLarge,
        }];
        let err = check_unpacked(&plan_with(skipped, unpacked), false).unwrap_err();
        assert!(err.to_string().starts_with("2 file(s) could not be packed"));
        assert!(check_unpacked(&plan_with(Vec::new(), Vec::new()), false).is_ok());
    }

    #[test]
    fn filler_has_exact_size() {
        let td = tempfile::tempdir().unwrap();
        let p = td.path().join("f.dat");
        write_filler(&p, 3 * WRITE_CHUNK as u64 + 17).unwrap();
        assert_eq!(fs::metadata(&p).unwrap().len(), 3 * WRITE_CHUNK as u64 + 17);
        let bytes = fs::read(&p).unwrap();
        assert_eq!(*bytes.last().unwrap(), b'\n');
    }
}
