use std::path::{Path, PathBuf};

pub const LEDGER_FILE: &str = "ledger.json";

pub fn tandem_root(home: &Path) -> PathBuf {
    home.join(".tandem")
}

pub fn ledger_path(home: &Path) -> PathBuf {
    tandem_root(home).join(LEDGER_FILE)
}
