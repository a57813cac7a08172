use std::{
    fs::File,
    io::{self, BufReader, BufWriter, StdoutLock, Write as _},
    path::{Path, PathBuf},
};

use anyhow::Context;
use keydiff_pipeline::source::JsonLinesSource;

/// Path argument meaning "standard output".
const STDOUT_PATH: &str = "-";

#[derive(Debug)]
pub enum Output {
    Stdout {
        writer: StdoutLock<'static>,
    },
    File {
        writer: BufWriter<File>,
        path: PathBuf,
    },
}

impl Output {
    pub fn save_json<T>(value: &T, output_path: &Path) -> anyhow::Result<()>
    where
        T: serde::Serialize,
    {
        let mut output = Output::from_output_path(output_path)?;
        output.write_json(value)
    }

    /// Opens `output_path` for writing, or standard output if it is `-`.
    pub fn from_output_path(output_path: &Path) -> anyhow::Result<Self> {
        if output_path.as_os_str() == STDOUT_PATH {
            Ok(Output::stdout())
        } else {
            Output::open(output_path.to_owned())
        }
    }

    pub fn stdout() -> Self {
        Output::Stdout {
            writer: io::stdout().lock(),
        }
    }

    pub fn open(path: PathBuf) -> anyhow::Result<Self> {
        let file = File::create(&path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;
        Ok(Output::File {
            writer: BufWriter::new(file),
            path,
        })
    }

    pub fn display_path(&self) -> String {
        match self {
            Output::Stdout { .. } => "stdout".to_string(),
            Output::File { path, .. } => path.display().to_string(),
        }
    }

    pub fn write_json<T>(&mut self, value: T) -> anyhow::Result<()>
    where
        T: serde::Serialize,
    {
        serde_json::to_writer_pretty(&mut *self, &value)
            .with_context(|| format!("Failed to write JSON to {}", self.display_path()))?;
        writeln!(&mut *self).with_context(|| {
            format!(
                "Failed to write newline after JSON to {}",
                self.display_path()
            )
        })?;
        self.flush()
            .with_context(|| format!("Failed to flush output to {}", self.display_path()))?;
        Ok(())
    }
}

impl io::Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Output::Stdout { writer } => writer.write(buf),
            Output::File { writer, .. } => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::Stdout { writer } => writer.flush(),
            Output::File { writer, .. } => writer.flush(),
        }
    }
}

/// Opens a JSON-Lines review file as a record source.
pub fn open_input(path: &Path) -> anyhow::Result<JsonLinesSource<BufReader<File>>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open input file: {}", path.display()))?;
    Ok(JsonLinesSource::new(BufReader::new(file)))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use keydiff_pipeline::source::RecordSource as _;

    use super::*;

    #[test]
    fn test_dash_means_stdout() {
        let output = Output::from_output_path(Path::new("-")).unwrap();
        assert!(matches!(output, Output::Stdout { .. }));
        assert_eq!(output.display_path(), "stdout");
    }

    #[test]
    fn test_save_json_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        Output::save_json(&serde_json::json!({"count": 3}), &path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\n  \"count\": 3\n}\n");
    }

    #[test]
    fn test_open_output_in_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = Output::from_output_path(&dir.path().join("missing/summary.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to create output file"));
    }

    #[test]
    fn test_open_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reviews.jsonl");
        fs::write(&path, "\n{\"asin\":\"B1\"}\n").unwrap();

        let mut source = open_input(&path).unwrap();
        let record = source.next_record().unwrap().unwrap();
        assert_eq!(record.row_key, "2");
        assert_eq!(record.payload, "{\"asin\":\"B1\"}");
        assert!(source.next_record().unwrap().is_none());

        assert!(open_input(&dir.path().join("missing.jsonl")).is_err());
    }
}
