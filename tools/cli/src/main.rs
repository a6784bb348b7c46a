//! BinVault CLI - Stage files through the encrypted attachment store.
//!
//! Useful for checking that attachments survive the encrypt, encode and
//! compress round trip, and for exporting a staged payload back out.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

use binvault_common::message;
use binvault_storage::{offload, AttachmentStore, BinaryData, FileBinary, StoreConfig};

#[derive(Parser)]
#[command(name = "binvault")]
#[command(about = "BinVault - Encrypted attachment staging")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stage files, read them back and verify the payload.
    Check {
        /// Files to stage.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Compress each binary after staging.
        #[arg(short, long)]
        compress: bool,

        /// Parent directory for the session store (default: the system temp dir).
        #[arg(short, long)]
        root: Option<PathBuf>,
    },

    /// Stage a file and write its payload back out.
    Export {
        /// Source file.
        input: PathBuf,

        /// Destination file.
        output: PathBuf,

        /// Compress the binary while it is staged.
        #[arg(short, long)]
        compress: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Check {
            files,
            compress,
            root,
        } => cmd_check(&files, compress, root).await,

        Commands::Export {
            input,
            output,
            compress,
        } => cmd_export(&input, &output, compress).await,
    }
}

/// Turn a store error into its user-facing message.
fn localized(err: binvault_common::Error) -> anyhow::Error {
    anyhow::anyhow!(message::render(&err))
}

/// Open a store in a session directory of its own under `parent`.
fn open_store(parent: Option<PathBuf>) -> Result<AttachmentStore> {
    let config = match parent {
        Some(parent) => {
            StoreConfig::new(parent.join(format!("binvault-{}", std::process::id())))
        }
        None => StoreConfig::default(),
    };
    AttachmentStore::open(config).map_err(localized)
}

/// Tear the store down, keeping the first error of `outcome`.
fn finish_session<T>(store: AttachmentStore, outcome: Result<T>) -> Result<T> {
    let torn = store.teardown().map_err(localized);
    let value = outcome?;
    torn?;
    Ok(value)
}

/// Copy `source` into a fresh binary, compressing it afterwards if asked.
async fn stage(store: &AttachmentStore, source: &Path, compress: bool) -> Result<FileBinary> {
    let mut input =
        File::open(source).with_context(|| format!("Failed to open {}", source.display()))?;

    let mut binary = store.new_binary(false, false);
    binary.write_all_from(&mut input).map_err(localized)?;
    debug!(source = %source.display(), size = binary.size(), "Staged file");

    if compress {
        binary = offload::compress(binary)
            .await
            .map_err(|e| localized(e.error))?;
    }
    Ok(binary)
}

/// Stage each file and verify it reads back unchanged.
async fn cmd_check(files: &[PathBuf], compress: bool, root: Option<PathBuf>) -> Result<()> {
    let store = open_store(root)?;
    let outcome = check_files(&store, files, compress).await;
    let mismatches = finish_session(store, outcome)?;

    if mismatches > 0 {
        anyhow::bail!("{} file(s) did not survive the round trip", mismatches);
    }
    info!("Checked {} file(s)", files.len());
    Ok(())
}

async fn check_files(store: &AttachmentStore, files: &[PathBuf], compress: bool) -> Result<usize> {
    let mut mismatches = 0;

    for file in files {
        let original =
            fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
        let binary = stage(store, file, compress).await?;
        let stored = binary
            .path()
            .map(|p| fs::metadata(p).map(|m| m.len()).unwrap_or(0))
            .unwrap_or(0);
        let payload = binary.read_payload().map_err(localized)?;
        let ok = payload == original;

        println!("{}", file.display());
        println!("  Size: {} bytes", binary.size());
        println!("  Hash: {:#010x}", binary.content_hash());
        println!("  Stored: {} bytes", stored);
        println!("  Compressed: {}", binary.is_compressed());
        println!("  Round trip: {}", if ok { "ok" } else { "MISMATCH" });

        if !ok {
            mismatches += 1;
        }
        store.remove(binary).map_err(localized)?;
    }
    Ok(mismatches)
}

/// Stage `input` and write its payload to `output`.
async fn cmd_export(input: &Path, output: &Path, compress: bool) -> Result<()> {
    let store = open_store(None)?;
    let outcome = export_payload(&store, input, output, compress).await;
    let copied = finish_session(store, outcome)?;

    println!("Exported {} bytes to {}", copied, output.display());
    Ok(())
}

async fn export_payload(
    store: &AttachmentStore,
    input: &Path,
    output: &Path,
    compress: bool,
) -> Result<u64> {
    let binary = stage(store, input, compress).await?;

    let mut reader = binary.open_read_payload().map_err(localized)?;
    let mut out =
        File::create(output).with_context(|| format!("Failed to create {}", output.display()))?;
    io::copy(&mut reader, &mut out).context("Failed to export payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_root_is_parent_of_session_directory() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("notes_temp"), b"user file").unwrap();

        let store = open_store(Some(temp.path().to_path_buf())).unwrap();
        assert_eq!(store.root().parent(), Some(temp.path()));
        store.teardown().unwrap();

        assert!(temp.path().is_dir());
        assert_eq!(fs::read(temp.path().join("notes_temp")).unwrap(), b"user file");
    }

    #[test]
    fn test_failed_session_still_tears_down() {
        let temp = TempDir::new().unwrap();
        let store = open_store(Some(temp.path().to_path_buf())).unwrap();
        let root = store.root().to_path_buf();
        let mut binary = store.new_binary(false, false);
        binary.write_all_from(&mut &b"staged"[..]).unwrap();

        let outcome: Result<()> = Err(anyhow::anyhow!("copy failed"));
        let err = finish_session(store, outcome).unwrap_err();

        assert_eq!(err.to_string(), "copy failed");
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn test_export_failure_removes_staged_ciphertext() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("input.bin");
        fs::write(&input, b"attachment").unwrap();
        let store = open_store(Some(temp.path().join("stores"))).unwrap();
        let root = store.root().to_path_buf();

        let missing_dir = temp.path().join("missing").join("out.bin");
        let outcome = export_payload(&store, &input, &missing_dir, false).await;
        assert!(finish_session(store, outcome).is_err());
        assert!(!root.exists());
    }
}
