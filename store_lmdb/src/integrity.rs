//! LMDB database integrity checks.
//!
//! Run on startup to detect corruption early, before the daemon begins
//! processing blocks.

use std::path::Path;

use gsp_store::PersistedGame;

/// Summary of an integrity check run.
#[derive(Debug, Default)]
pub struct IntegrityReport {
    pub state_entries: usize,
    pub undo_records: usize,
    pub errors: Vec<String>,
}

impl IntegrityReport {
    /// Returns `true` if no errors were detected.
    pub fn is_healthy(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Check that a loaded game is self-consistent.
///
/// - anchor and tip are either both present or both absent
/// - the tip is not below the anchor
/// - undo records form one chain whose newest block is the tip
pub fn check_integrity(game: &PersistedGame) -> IntegrityReport {
    let mut report = IntegrityReport {
        state_entries: game.state.len(),
        undo_records: game.undo.len(),
        errors: Vec::new(),
    };

    match (game.anchor, game.tip) {
        (None, None) => {
            if !game.state.is_empty() || !game.undo.is_empty() {
                report
                    .errors
                    .push("game data present without a chain tip".to_string());
            }
            return report;
        }
        (Some(anchor), Some(tip)) => {
            if tip.height < anchor.height {
                report.errors.push(format!(
                    "tip height {} is below anchor height {}",
                    tip.height, anchor.height
                ));
            }
            if let Some(newest) = game.undo.last() {
                if newest.tip() != tip {
                    report.errors.push(format!(
                        "newest undo record {} does not match tip {}",
                        newest.tip(),
                        tip
                    ));
                }
            }
        }
        _ => report
            .errors
            .push("only one of anchor and tip is stored".to_string()),
    }

    for pair in game.undo.windows(2) {
        let (older, newer) = (&pair[0], &pair[1]);
        if newer.height != older.height + 1 || newer.parent != older.hash {
            report.errors.push(format!(
                "undo record at height {} does not extend the one at height {}",
                newer.height, older.height
            ));
        }
    }

    report
}

/// Check if the LMDB data directory looks valid before opening.
///
/// Returns `Ok(())` for a fresh (nonexistent or empty) directory. Returns an
/// error if the directory has content but `data.mdb` is missing, which
/// suggests corruption or misconfiguration.
pub fn check_data_dir(path: &Path) -> Result<(), String> {
    if !path.exists() {
        return Ok(());
    }
    let is_empty = path
        .read_dir()
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?
        .next()
        .is_none();
    if is_empty {
        return Ok(());
    }
    if !path.join("data.mdb").exists() {
        return Err(format!(
            "LMDB directory is not empty but data.mdb is missing at {}",
            path.display()
        ));
    }
    Ok(())
}
