use clap::Parser;
use std::path::PathBuf;

/// Import EPUB ebooks into a Markdown note vault
#[derive(Parser, Debug)]
#[command(name = "epub2vault", version, about)]
pub struct Cli {
    /// EPUB files to import; each becomes its own folder
    #[arg(required = true)]
    pub input: Vec<PathBuf>,

    /// Vault folder the books are imported into
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Log every imported and skipped file
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}
