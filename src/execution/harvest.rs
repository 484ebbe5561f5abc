//! Inventory of a scratch directory after a successful run.

use std::{collections::HashMap, fs, io, path::Path};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

use super::{
    harness::Preview,
    FileArtifact, PlotArtifact,
};

const TABULAR_EXTENSIONS: &[&str] = &["csv", "xlsx", "xls"];
const PREVIEW_UNAVAILABLE: &str = "preview unavailable";

#[derive(Debug, Default)]
pub struct Harvest {
    pub files: Vec<FileArtifact>,
    pub plots: Vec<PlotArtifact>,
}

impl Harvest {
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files
            .iter()
            .map(|f| f.path.as_path())
            .chain(self.plots.iter().map(|p| p.path.as_path()))
    }
}

/// `plot_<n>.png` as written by the figure epilogue (or by the snippet itself).
pub fn is_plot(filename: &str) -> bool {
    filename.starts_with("plot_") && filename.ends_with(".png")
}

pub fn is_tabular(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| TABULAR_EXTENSIONS.iter().any(|t| ext.eq_ignore_ascii_case(t)))
}

/// Classify every regular file directly inside `scratch`.
///
/// Symlinks and subdirectories are ignored. Plots are ordered by figure
/// number, files by name.
pub fn harvest(scratch: &Path, previews: &HashMap<String, Preview>) -> io::Result<Harvest> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(scratch)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            debug!(path = %entry.path().display(), "skipping non-regular entry");
            continue;
        }
        // Non-UTF-8 names are reported lossily; `path` stays exact.
        let name = entry.file_name().to_string_lossy().into_owned();
        entries.push((name, entry.path()));
    }
    entries.sort();

    let mut out = Harvest::default();
    for (filename, path) in entries {
        if is_plot(&filename) {
            let data = STANDARD.encode(fs::read(&path)?);
            out.plots.push(PlotArtifact { filename, path, data });
            continue;
        }

        let mut file = FileArtifact { filename, path, preview: None, preview_error: None };
        if is_tabular(&file.filename) {
            match previews.get(&file.filename) {
                Some(Preview::Html { html }) => file.preview = Some(html.clone()),
                Some(Preview::Failed { error }) => file.preview_error = Some(error.clone()),
                None => file.preview_error = Some(PREVIEW_UNAVAILABLE.to_string()),
            }
        }
        out.files.push(file);
    }

    out.plots.sort_by_key(|p| (figure_number(&p.filename), p.filename.clone()));
    Ok(out)
}

fn figure_number(filename: &str) -> u64 {
    filename
        .strip_prefix("plot_")
        .and_then(|s| s.strip_suffix(".png"))
        .and_then(|n| n.parse().ok())
        .unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_plots_and_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("plot_2.png"), b"\x89PNG two").unwrap();
        fs::write(dir.path().join("plot_10.png"), b"\x89PNG ten").unwrap();
        fs::write(dir.path().join("plot_1.png"), b"\x89PNG one").unwrap();
        fs::write(dir.path().join("summary.txt"), "ok").unwrap();
        fs::write(dir.path().join("out.csv"), "a\n1\n2\n").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("deep.csv"), "x").unwrap();

        let previews = HashMap::from([(
            "out.csv".to_string(),
            Preview::Html { html: "<table><td>1</td><td>2</td></table>".into() },
        )]);
        let h = harvest(dir.path(), &previews).unwrap();

        let plot_names: Vec<_> = h.plots.iter().map(|p| p.filename.as_str()).collect();
        assert_eq!(plot_names, ["plot_1.png", "plot_2.png", "plot_10.png"]);
        assert_eq!(h.plots[0].data, STANDARD.encode(b"\x89PNG one"));

        let file_names: Vec<_> = h.files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(file_names, ["out.csv", "summary.txt"]);
        assert!(h.files[0].preview.as_deref().unwrap().contains("<td>1</td>"));
        assert_eq!(h.files[1].preview, None);
        assert_eq!(h.files[1].preview_error, None);
        assert_eq!(h.paths().count(), 5);
    }

    #[test]
    fn preview_failures_stay_on_their_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.xlsx"), "not a workbook").unwrap();
        fs::write(dir.path().join("orphan.CSV"), "a\n1\n").unwrap();
        fs::write(dir.path().join("fine.csv"), "a\n1\n").unwrap();

        let previews = HashMap::from([
            ("broken.xlsx".to_string(), Preview::Failed { error: "bad zip".into() }),
            ("fine.csv".to_string(), Preview::Html { html: "<table/>".into() }),
        ]);
        let h = harvest(dir.path(), &previews).unwrap();
        assert_eq!(h.files.len(), 3);
        let by_name = |n: &str| h.files.iter().find(|f| f.filename == n).unwrap();
        assert_eq!(by_name("broken.xlsx").preview_error.as_deref(), Some("bad zip"));
        assert_eq!(by_name("orphan.CSV").preview_error.as_deref(), Some(PREVIEW_UNAVAILABLE));
        assert_eq!(by_name("fine.csv").preview.as_deref(), Some("<table/>"));
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_not_harvested() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::NamedTempFile::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("plot_1.png")).unwrap();
        let h = harvest(dir.path(), &HashMap::new()).unwrap();
        assert!(h.plots.is_empty());
        assert!(h.files.is_empty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn non_utf8_names_are_still_listed() {
        use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

        let dir = tempfile::tempdir().unwrap();
        let raw = OsStr::from_bytes(b"report_\xff.txt");
        fs::write(dir.path().join(raw), "x").unwrap();

        let h = harvest(dir.path(), &HashMap::new()).unwrap();
        assert_eq!(h.files.len(), 1);
        assert_eq!(h.files[0].filename, "report_\u{FFFD}.txt");
        assert_eq!(h.files[0].path, dir.path().join(raw));
        assert!(h.files[0].path.is_file());
    }

    #[test]
    fn plot_and_tabular_detection() {
        assert!(is_plot("plot_3.png"));
        assert!(is_plot("plot_summary.png"));
        assert!(!is_plot("my_plot_3.png"));
        assert!(!is_plot("plot_3.jpg"));
        assert!(is_tabular("data.XLS"));
        assert!(!is_tabular("data.json"));
        assert!(!is_tabular("csv"));
    }
}
