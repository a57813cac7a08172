//! Key/value datasets passed between stages.
//!
//! A dataset is a directory holding one or more `part-r-NNNNN` text files and an
//! empty `_SUCCESS` marker:
//!
//! ```text
//! averages/
//! ├─ part-r-00000
//! └─ _SUCCESS
//! ```
//!
//! Each line of a part file is one record, `<key>\t<value>\n`. Keys never
//! contain a tab or a line break. The marker is written after every part file
//! has been flushed, so a dataset without it is incomplete and must not be
//! consumed.

use std::{
    fs::{self, File},
    io::{self, BufRead as _, BufWriter, Write as _},
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::Arc,
};

/// Name of the completion marker.
pub const SUCCESS_MARKER: &str = "_SUCCESS";

const PART_PREFIX: &str = "part-";

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum DatasetError {
    #[display("output path already exists: {}", path.display())]
    OutputExists {
        path: PathBuf,
    },
    #[display("dataset is incomplete (no _SUCCESS marker): {}", path.display())]
    Incomplete {
        path: PathBuf,
    },
    #[display("key {key:?} contains a tab or line break")]
    InvalidKey {
        key: String,
    },
    #[display("I/O error on {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

impl DatasetError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| DatasetError::Io {
            path: path.to_owned(),
            source,
        }
    }
}

/// Formats a floating point value for a dataset.
///
/// Uses the shortest representation that round-trips, always with a decimal
/// point or exponent (`4.0`, `0.5`, `1e-7`).
#[must_use]
pub fn format_value(value: f64) -> String {
    format!("{value:?}")
}

/// Parses a floating point field written by [`format_value`].
#[must_use]
pub fn parse_value(text: &str) -> Option<f64> {
    text.trim().parse().ok()
}

/// Fails with [`DatasetError::OutputExists`] if `path` is already present.
pub fn ensure_absent(path: &Path) -> Result<(), DatasetError> {
    match fs::symlink_metadata(path) {
        Ok(_) => Err(DatasetError::OutputExists {
            path: path.to_owned(),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DatasetError::io(path)(e)),
    }
}

/// Writes `records` as a new dataset at `path`.
///
/// The directory must not exist yet. Records are written in the given order.
/// Returns the number of records written.
pub fn write<'a, I>(path: &Path, records: I) -> Result<usize, DatasetError>
where
    I: IntoIterator<Item = (&'a str, String)>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(DatasetError::io(parent))?;
    }
    fs::create_dir(path).map_err(|e| {
        if e.kind() == io::ErrorKind::AlreadyExists {
            DatasetError::OutputExists {
                path: path.to_owned(),
            }
        } else {
            DatasetError::io(path)(e)
        }
    })?;

    let part_path = path.join(format!("{PART_PREFIX}r-00000"));
    let file = File::create(&part_path).map_err(DatasetError::io(&part_path))?;
    let mut writer = BufWriter::new(file);
    let mut written = 0;
    for (key, value) in records {
        if key.contains(['\t', '\n', '\r']) {
            return Err(DatasetError::InvalidKey {
                key: key.to_owned(),
            });
        }
        writeln!(writer, "{key}\t{value}").map_err(DatasetError::io(&part_path))?;
        written += 1;
    }
    writer.flush().map_err(DatasetError::io(&part_path))?;
    drop(writer);

    let marker = path.join(SUCCESS_MARKER);
    File::create(&marker).map_err(DatasetError::io(&marker))?;
    Ok(written)
}

/// One line of a part file, with enough context to report it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetLine {
    /// File the line was read from.
    pub file: Arc<str>,
    /// 1-based line number within `file`.
    pub line_number: usize,
    /// The line without its terminator.
    pub text: String,
}

/// A line split into its key and value fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyValue<'a> {
    pub key: &'a str,
    pub value: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum LineFormatError {
    #[display("{file}:{line_number}: missing tab separator")]
    MissingSeparator {
        file: Arc<str>,
        line_number: usize,
    },
    #[display("{file}:{line_number}: empty key")]
    EmptyKey {
        file: Arc<str>,
        line_number: usize,
    },
    #[display("{file}:{line_number}: value {value:?} is not a number")]
    InvalidValue {
        file: Arc<str>,
        line_number: usize,
        value: String,
    },
}

impl DatasetLine {
    /// Splits the line at its first tab.
    pub fn key_value(&self) -> Result<KeyValue<'_>, LineFormatError> {
        let (key, value) =
            self.text
                .split_once('\t')
                .ok_or_else(|| LineFormatError::MissingSeparator {
                    file: Arc::clone(&self.file),
                    line_number: self.line_number,
                })?;
        if key.is_empty() {
            return Err(LineFormatError::EmptyKey {
                file: Arc::clone(&self.file),
                line_number: self.line_number,
            });
        }
        Ok(KeyValue { key, value })
    }

    /// Splits the line and parses its value as a number.
    pub fn number(&self) -> Result<(&str, f64), LineFormatError> {
        let KeyValue { key, value } = self.key_value()?;
        let number = parse_value(value).ok_or_else(|| LineFormatError::InvalidValue {
            file: Arc::clone(&self.file),
            line_number: self.line_number,
            value: value.to_owned(),
        })?;
        Ok((key, number))
    }
}

/// Reads a complete dataset, splitting its lines into partitions of at most
/// `batch_size` lines. Part files are read in name order.
pub fn read_partitions(
    path: &Path,
    batch_size: NonZeroUsize,
) -> Result<Vec<Vec<DatasetLine>>, DatasetError> {
    if !path.join(SUCCESS_MARKER).is_file() {
        return Err(DatasetError::Incomplete {
            path: path.to_owned(),
        });
    }

    let mut part_files = vec![];
    for entry in fs::read_dir(path).map_err(DatasetError::io(path))? {
        let entry = entry.map_err(DatasetError::io(path))?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with(PART_PREFIX) {
            part_files.push(entry.path());
        }
    }
    part_files.sort();

    let batch_size = batch_size.get();
    let mut partitions = vec![];
    for part_path in part_files {
        let file_name = Arc::<str>::from(part_path.to_string_lossy());
        let file = File::open(&part_path).map_err(DatasetError::io(&part_path))?;
        let mut batch = vec![];
        for (index, line) in io::BufReader::new(file).lines().enumerate() {
            let text = line.map_err(DatasetError::io(&part_path))?;
            batch.push(DatasetLine {
                file: Arc::clone(&file_name),
                line_number: index + 1,
                text,
            });
            if batch.len() == batch_size {
                partitions.push(std::mem::take(&mut batch));
            }
        }
        if !batch.is_empty() {
            partitions.push(batch);
        }
    }
    Ok(partitions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(text: &str) -> DatasetLine {
        DatasetLine {
            file: Arc::from("part-r-00000"),
            line_number: 3,
            text: text.to_owned(),
        }
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(4.0), "4.0");
        assert_eq!(format_value(0.0), "0.0");
        assert_eq!(format_value(2.5), "2.5");
        assert_eq!(format_value(10.0 / 3.0), "3.3333333333333335");
        assert_eq!(parse_value(&format_value(10.0 / 3.0)), Some(10.0 / 3.0));
    }

    #[test]
    fn test_write_and_read_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out");
        let written = write(
            &path,
            [("B1", "4.0".to_owned()), ("B1Contains", "4.0".to_owned())],
        )
        .unwrap();
        assert_eq!(written, 2);
        assert!(path.join(SUCCESS_MARKER).is_file());
        assert_eq!(
            fs::read_to_string(path.join("part-r-00000")).unwrap(),
            "B1\t4.0\nB1Contains\t4.0\n"
        );

        let partitions = read_partitions(&path, NonZeroUsize::MIN).unwrap();
        assert_eq!(partitions.len(), 2);
        assert_eq!(partitions[1][0].line_number, 2);
        assert_eq!(partitions[1][0].number().unwrap(), ("B1Contains", 4.0));
    }

    #[test]
    fn test_write_refuses_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let err = write(dir.path(), []).unwrap_err();
        assert!(matches!(err, DatasetError::OutputExists { .. }));
        assert!(matches!(
            ensure_absent(dir.path()),
            Err(DatasetError::OutputExists { .. })
        ));
        assert!(ensure_absent(&dir.path().join("missing")).is_ok());
    }

    #[test]
    fn test_write_rejects_tab_in_key() {
        let dir = tempfile::tempdir().unwrap();
        let err = write(&dir.path().join("out"), [("a\tb", "1".to_owned())]).unwrap_err();
        assert!(matches!(err, DatasetError::InvalidKey { .. }));
    }

    #[test]
    fn test_read_requires_success_marker() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("part-r-00000"), "B1\t1.0\n").unwrap();
        let err = read_partitions(dir.path(), NonZeroUsize::MIN).unwrap_err();
        assert!(matches!(err, DatasetError::Incomplete { .. }));
    }

    #[test]
    fn test_read_multiple_part_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("part-r-00001"), "B2\t2.0\n").unwrap();
        fs::write(dir.path().join("part-r-00000"), "B1\t1.0\n").unwrap();
        fs::write(dir.path().join(".part-r-00000.crc"), "junk").unwrap();
        fs::write(dir.path().join(SUCCESS_MARKER), "").unwrap();
        let lines = read_partitions(dir.path(), NonZeroUsize::new(10).unwrap())
            .unwrap()
            .into_iter()
            .flatten()
            .map(|line| line.text)
            .collect::<Vec<_>>();
        assert_eq!(lines, ["B1\t1.0", "B2\t2.0"]);
    }

    #[test]
    fn test_key_value_uses_first_tab() {
        let line = line("B1\t4.0\textra");
        assert_eq!(
            line.key_value().unwrap(),
            KeyValue {
                key: "B1",
                value: "4.0\textra"
            }
        );
        assert!(matches!(
            line.number(),
            Err(LineFormatError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_malformed_lines() {
        assert!(matches!(
            line("B1 4.0").key_value(),
            Err(LineFormatError::MissingSeparator { .. })
        ));
        assert!(matches!(
            line("\t4.0").key_value(),
            Err(LineFormatError::EmptyKey { .. })
        ));
        let err = line("B1\tabc").number().unwrap_err();
        assert_eq!(err.to_string(), "part-r-00000:3: value \"abc\" is not a number");
    }
}
