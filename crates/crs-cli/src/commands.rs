use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{bail, Context};
use colored::Colorize;
use crs_sdk::{ContextReferenceStore, StoreConfig, StoreHints};
use crs_store::{DiskBackend, TierBackend};
use crs_types::{ContentDigest, ContentKind, Handle, Location};
use serde_json::json;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let format = cli.format;
    match cli.command {
        Command::Ingest(args) => cmd_ingest(config, args, format),
        Command::Get(args) => cmd_get(&config, args, format),
        Command::Fsck => cmd_fsck(&config, format),
        Command::Stats => cmd_stats(&config, format),
        Command::Config => cmd_config(&config, format),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<StoreConfig> {
    let mut config = match &cli.config {
        Some(path) => StoreConfig::load(path)?,
        None => StoreConfig::default(),
    };
    if let Some(root) = &cli.root {
        config.disk_root = root.clone();
    }
    config.validate()?;
    Ok(config)
}

fn open_disk(config: &StoreConfig) -> anyhow::Result<DiskBackend> {
    DiskBackend::open(&config.disk_root, config.disk_capacity_bytes)
        .with_context(|| format!("opening disk tier at {}", config.disk_root.display()))
}

/// Guess a kind from the extension and whether the bytes are UTF-8.
fn infer_kind(path: &Path, data: &[u8]) -> ContentKind {
    if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")) {
        ContentKind::Structured
    } else if std::str::from_utf8(data).is_ok() {
        ContentKind::Text
    } else {
        ContentKind::Binary
    }
}

// ---------------------------------------------------------------------------
// ingest
// ---------------------------------------------------------------------------

struct Ingested {
    path: String,
    digest: ContentDigest,
    kind: ContentKind,
    placed: Location,
    size: u64,
    deduplicated: bool,
}

fn ingest(config: StoreConfig, args: &IngestArgs) -> anyhow::Result<(Vec<Ingested>, usize)> {
    let store = ContextReferenceStore::open(config)?;
    let mut rows = Vec::with_capacity(args.paths.len());
    for path in &args.paths {
        let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let kind = args
            .kind
            .map(ContentKind::from)
            .unwrap_or_else(|| infer_kind(path, &data));

        let before = store.stats().dedup_hits;
        let reference = store
            .store(&data, kind, StoreHints::new())
            .with_context(|| format!("storing {}", path.display()))?;
        let deduplicated = store.stats().dedup_hits > before;
        store.release(&reference)?;

        rows.push(Ingested {
            path: path.display().to_string(),
            digest: reference.digest,
            kind,
            placed: reference.handle.location,
            size: reference.metadata.size_bytes,
            deduplicated,
        });
    }
    let spilled = store.spill_to_disk();
    Ok((rows, spilled))
}

fn cmd_ingest(config: StoreConfig, args: IngestArgs, format: OutputFormat) -> anyhow::Result<()> {
    let (rows, spilled) = ingest(config, &args)?;
    match format {
        OutputFormat::Json => {
            let items: Vec<_> = rows
                .iter()
                .map(|r| {
                    json!({
                        "path": r.path,
                        "digest": r.digest.to_hex(),
                        "kind": r.kind.to_string(),
                        "placed": r.placed.to_string(),
                        "size": r.size,
                        "deduplicated": r.deduplicated,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json!({ "ingested": items, "spilled": spilled }))?);
        }
        OutputFormat::Text => {
            for r in &rows {
                let status = if r.deduplicated { "dedup".yellow() } else { "new".green() };
                println!(
                    "{} {} {} ({}, {}, {} bytes) {}",
                    "✓".green().bold(),
                    r.digest.to_hex().cyan(),
                    r.path,
                    r.kind,
                    r.placed,
                    r.size,
                    status,
                );
            }
            if spilled > 0 {
                println!("  Spilled {} memory entries to disk", spilled.to_string().bold());
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// get
// ---------------------------------------------------------------------------

fn read_payload(config: &StoreConfig, hex: &str) -> anyhow::Result<(ContentDigest, Vec<u8>)> {
    let digest = ContentDigest::from_hex(hex).with_context(|| format!("invalid digest {hex}"))?;
    let disk = open_disk(config)?;
    let data = disk
        .get(&Handle::new(Location::Disk, digest))
        .with_context(|| format!("reading {digest}"))?;
    Ok((digest, data.to_vec()))
}

fn cmd_get(config: &StoreConfig, args: GetArgs, format: OutputFormat) -> anyhow::Result<()> {
    let (digest, data) = read_payload(config, &args.digest)?;
    let Some(out) = args.out else {
        io::stdout().write_all(&data)?;
        return Ok(());
    };
    fs::write(&out, &data).with_context(|| format!("writing {}", out.display()))?;
    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({ "digest": digest.to_hex(), "size": data.len(), "out": out.display().to_string() })
        ),
        OutputFormat::Text => println!(
            "{} Wrote {} bytes to {}",
            "✓".green().bold(),
            data.len(),
            out.display().to_string().bold()
        ),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// fsck / stats / config
// ---------------------------------------------------------------------------

fn check_disk(config: &StoreConfig) -> anyhow::Result<(usize, Vec<(ContentDigest, String)>)> {
    let disk = open_disk(config)?;
    let mut ok = 0;
    let mut failures = Vec::new();
    for (digest, _) in disk.entries() {
        match disk.verify(&digest) {
            Ok(()) => ok += 1,
            Err(err) => failures.push((digest, err.to_string())),
        }
    }
    Ok((ok, failures))
}

fn cmd_fsck(config: &StoreConfig, format: OutputFormat) -> anyhow::Result<()> {
    let (ok, failures) = check_disk(config)?;
    match format {
        OutputFormat::Json => {
            let bad: Vec<_> = failures
                .iter()
                .map(|(d, e)| json!({ "digest": d.to_hex(), "error": e }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&json!({ "ok": ok, "failures": bad }))?);
        }
        OutputFormat::Text => {
            for (digest, err) in &failures {
                println!("{} {} {}", "✗".red().bold(), digest.to_hex().cyan(), err);
            }
            if failures.is_empty() {
                println!("{} {} payloads verified, no issues.", "✓".green().bold(), ok);
            }
        }
    }
    if !failures.is_empty() {
        bail!("{} of {} payloads failed verification", failures.len(), ok + failures.len());
    }
    Ok(())
}

fn cmd_stats(config: &StoreConfig, format: OutputFormat) -> anyhow::Result<()> {
    let disk = open_disk(config)?;
    let used = disk.current_bytes_used();
    let capacity = disk.capacity_bytes();
    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "root": config.disk_root.display().to_string(),
                "payloads": disk.len(),
                "bytes_used": used,
                "capacity_bytes": capacity,
            }))?
        ),
        OutputFormat::Text => {
            println!("Disk tier: {}", config.disk_root.display().to_string().bold());
            println!("  Payloads: {}", disk.len().to_string().bold());
            println!("  Used: {} / {} bytes", used.to_string().bold(), capacity);
        }
    }
    Ok(())
}

fn cmd_config(config: &StoreConfig, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        OutputFormat::Text => print!("{}", config.to_toml_string()?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::PathBuf;

    fn config_in(dir: &Path) -> StoreConfig {
        StoreConfig::with_root(dir.join("store"))
    }

    fn write(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn infers_kind_from_extension_and_encoding() {
        assert_eq!(infer_kind(Path::new("a.JSON"), b"{}"), ContentKind::Structured);
        assert_eq!(infer_kind(Path::new("notes.md"), b"hello"), ContentKind::Text);
        assert_eq!(infer_kind(Path::new("blob"), &[0xff, 0xfe, 0x00]), ContentKind::Binary);
    }

    #[test]
    fn ingest_persists_every_file_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.txt", b"alpha alpha alpha");
        let b = write(dir.path(), "b.bin", &[0xff, 1, 2, 3]);
        let args = IngestArgs { paths: vec![a, b], kind: None };

        let (rows, spilled) = ingest(config_in(dir.path()), &args).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| !r.deduplicated));
        assert_eq!(rows[0].kind, ContentKind::Text);
        assert_eq!(rows[1].kind, ContentKind::Binary);
        assert_eq!(spilled, 2);

        let (digest, data) = read_payload(&config_in(dir.path()), &rows[0].digest.to_hex()).unwrap();
        assert_eq!(digest, rows[0].digest);
        assert_eq!(data, b"alpha alpha alpha");
    }

    #[test]
    fn second_ingest_of_same_file_is_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.txt", b"same bytes");
        let args = IngestArgs { paths: vec![a], kind: Some(KindArg::Text) };

        ingest(config_in(dir.path()), &args).unwrap();
        let (rows, spilled) = ingest(config_in(dir.path()), &args).unwrap();
        assert!(rows[0].deduplicated);
        assert_eq!(spilled, 0);
    }

    #[test]
    fn get_rejects_malformed_digest() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_payload(&config_in(dir.path()), "not-hex").is_err());
    }

    #[test]
    fn fsck_reports_tampered_payload() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.txt", b"original text");
        let args = IngestArgs { paths: vec![a], kind: None };
        let (rows, _) = ingest(config_in(dir.path()), &args).unwrap();

        let config = config_in(dir.path());
        let (ok, failures) = check_disk(&config).unwrap();
        assert_eq!((ok, failures.len()), (1, 0));

        let disk = open_disk(&config).unwrap();
        fs::write(disk.path_for(&rows[0].digest), b"tampered text").unwrap();
        let (ok, failures) = check_disk(&config).unwrap();
        assert_eq!(ok, 0);
        assert_eq!(failures[0].0, rows[0].digest);
        assert!(cmd_fsck(&config, OutputFormat::Text).is_err());
    }

    #[test]
    fn root_flag_overrides_configured_root() {
        let cli = Cli::try_parse_from(["crs", "stats", "--root", "/tmp/crs-elsewhere"]).unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.disk_root, PathBuf::from("/tmp/crs-elsewhere"));
    }
}
