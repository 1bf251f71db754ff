//! Command-line arguments.

use clap::{Parser, ValueEnum};
use vault::{IdRange, RecordKind, RotationOptions};

/// Re-encrypt every encrypted PII field from the old key to the new key.
///
/// Keys come from the environment (`OLD_FIELD_SECRET` / `FIELD_SECRET` and
/// their salts). Keep the old key configured until a run reports zero
/// failures.
#[derive(Debug, Parser)]
#[command(name = "rotate-keys")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Records loaded and re-encrypted per page
    #[arg(long, default_value_t = 100, value_parser = parse_chunk_size)]
    pub chunk_size: usize,

    /// Decrypt and re-encrypt in memory, but never write
    #[arg(long)]
    pub dry_run: bool,

    /// Record type to rotate
    #[arg(long, value_enum, default_value_t = Model::All)]
    pub model: Model,

    /// Lowest record id to rotate (inclusive)
    #[arg(long, value_name = "ID")]
    pub start_id: Option<i64>,

    /// Highest record id to rotate (inclusive)
    #[arg(long, value_name = "ID")]
    pub end_id: Option<i64>,

    /// Print the final summary as JSON instead of text lines
    #[arg(long)]
    pub json: bool,
}

/// Value of `--model`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Model {
    All,
    Customer,
    Address,
    Restaurant,
}

impl Model {
    pub fn targets(self) -> Vec<RecordKind> {
        match self {
            Model::All => RecordKind::ALL.to_vec(),
            Model::Customer => vec![RecordKind::Customer],
            Model::Address => vec![RecordKind::Address],
            Model::Restaurant => vec![RecordKind::Restaurant],
        }
    }
}

impl Args {
    pub fn rotation_options(&self, progress_every: u64) -> RotationOptions {
        RotationOptions {
            targets: self.model.targets(),
            chunk_size: self.chunk_size,
            dry_run: self.dry_run,
            id_range: IdRange::new(self.start_id, self.end_id),
            progress_every,
        }
    }
}

fn parse_chunk_size(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("chunk size must be greater than zero".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(format!("invalid chunk size: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("rotate-keys").chain(args.iter().copied()))
    }

    #[test]
    fn defaults() {
        let args = parse(&[]).unwrap();
        assert_eq!(args.chunk_size, 100);
        assert!(!args.dry_run);
        assert_eq!(args.model, Model::All);
        assert!(!args.json);

        let opts = args.rotation_options(100);
        assert_eq!(opts.targets, RecordKind::ALL.to_vec());
        assert_eq!(opts.id_range, IdRange::all());
    }

    #[test]
    fn single_model_and_range() {
        let args = parse(&[
            "--model", "address", "--chunk-size", "25", "--start-id", "10", "--end-id", "99",
            "--dry-run",
        ])
        .unwrap();
        let opts = args.rotation_options(50);
        assert_eq!(opts.targets, vec![RecordKind::Address]);
        assert_eq!(opts.chunk_size, 25);
        assert!(opts.dry_run);
        assert_eq!(opts.id_range, IdRange::new(Some(10), Some(99)));
        assert_eq!(opts.progress_every, 50);
    }

    #[test]
    fn zero_chunk_size_rejected() {
        assert!(parse(&["--chunk-size", "0"]).is_err());
        assert!(parse(&["--chunk-size", "many"]).is_err());
    }

    #[test]
    fn unknown_model_rejected() {
        assert!(parse(&["--model", "orders"]).is_err());
    }
}
