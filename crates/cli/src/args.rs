use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "splitter-cli", about = "Play a split/withdraw script against a fresh ledger")]
pub struct Args {
    /// JSON array of register/split/withdraw steps.
    pub script: PathBuf,

    /// Also write the resulting journal to this path.
    #[arg(long)]
    pub journal_out: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_path_alone() {
        let args = Args::try_parse_from(["splitter-cli", "s.json"]).unwrap();
        assert_eq!(args.script, PathBuf::from("s.json"));
        assert!(args.journal_out.is_none());
    }

    #[test]
    fn journal_out_flag() {
        let args =
            Args::try_parse_from(["splitter-cli", "s.json", "--journal-out", "j.json"]).unwrap();
        assert_eq!(args.journal_out, Some(PathBuf::from("j.json")));
    }

    #[test]
    fn stray_arguments_are_rejected() {
        assert!(
            Args::try_parse_from(["splitter-cli", "s.json", "--journal-out", "j.json", "stray"])
                .is_err()
        );
        assert!(Args::try_parse_from(["splitter-cli", "s.json", "--journal-out"]).is_err());
        assert!(Args::try_parse_from(["splitter-cli"]).is_err());
    }
}
