//! Minimal manifest reader: one `wav-path<TAB>label` pair per line.
//! Blank lines and `#` comments are ignored.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};

use voxlid_dataset::ManifestEntry;

pub fn read(path: &Path) -> anyhow::Result<Vec<ManifestEntry>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading manifest {}", path.display()))?;

    let mut entries = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((wav, label)) = line.split_once('\t') else {
            bail!(
                "{}:{}: expected `wav-path<TAB>label`, got {:?}",
                path.display(),
                lineno + 1,
                line
            );
        };
        let label = label.trim();
        if label.is_empty() {
            bail!("{}:{}: empty label", path.display(), lineno + 1);
        }
        entries.push(ManifestEntry {
            path: PathBuf::from(wav.trim()),
            label: label.to_string(),
        });
    }
    Ok(entries)
}
