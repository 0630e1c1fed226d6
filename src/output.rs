//! Dual console/file sink for finished vehicle profiles.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{self, BufWriter, Stdout, Write};

use crate::config::{OutputConfig, OutputFormat};
use crate::profile::{format, VehicleProfile};

/// Writes every profile to the output file and optionally to the console.
pub struct DualSink<F: Write = BufWriter<File>, C: Write = Stdout> {
    file: F,
    console: Option<C>,
    format: OutputFormat,
    emitted: usize,
}

impl DualSink {
    pub fn open(config: &OutputConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating output directory {}", parent.display()))?;
        }
        let file = File::create(&config.path)
            .with_context(|| format!("creating output file {}", config.path.display()))?;

        Ok(Self::with_writers(
            BufWriter::new(file),
            config.console.then(io::stdout),
            config.format,
        ))
    }
}

impl<F: Write, C: Write> DualSink<F, C> {
    pub fn with_writers(file: F, console: Option<C>, format: OutputFormat) -> Self {
        Self {
            file,
            console,
            format,
            emitted: 0,
        }
    }

    pub fn emit(&mut self, profile: &VehicleProfile) -> Result<()> {
        let rendered = match self.format {
            OutputFormat::Text => format::render_text(profile) + "\n",
            OutputFormat::Json => serde_json::to_string(profile)? + "\n",
        };

        self.file.write_all(rendered.as_bytes())?;
        if let Some(console) = self.console.as_mut() {
            console.write_all(rendered.as_bytes())?;
        }
        self.emitted += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<usize> {
        self.file.flush()?;
        if let Some(console) = self.console.as_mut() {
            console.flush()?;
        }
        Ok(self.emitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::fixtures::sample_profile;
    use std::path::PathBuf;

    #[test]
    fn test_text_goes_to_both_sinks() {
        let mut file = Vec::new();
        let mut console = Vec::new();
        {
            let mut sink = DualSink::with_writers(&mut file, Some(&mut console), OutputFormat::Text);
            sink.emit(&sample_profile(1)).unwrap();
            sink.emit(&sample_profile(2)).unwrap();
            assert_eq!(sink.finish().unwrap(), 2);
        }

        let text = String::from_utf8(file).unwrap();
        assert_eq!(text, String::from_utf8(console).unwrap());
        assert_eq!(text.matches("=== Vehicle 1 |").count(), 2);
        assert!(text.contains("ChargeOnRoad: "));
    }

    #[test]
    fn test_json_lines() {
        let mut file = Vec::new();
        let mut sink = DualSink::with_writers(&mut file, None::<Vec<u8>>, OutputFormat::Json);
        sink.emit(&sample_profile(4)).unwrap();
        sink.finish().unwrap();

        let text = String::from_utf8(file).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 1);
        let back: VehicleProfile = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(back.days.len(), 1);
        assert_eq!(back.purpose, crate::domain::Purpose::Private);
    }

    #[test]
    fn test_open_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path: PathBuf = dir.path().join("nested/out/profiles.txt");
        let config = OutputConfig {
            path: path.clone(),
            format: OutputFormat::Text,
            console: false,
        };

        let mut sink = DualSink::open(&config).unwrap();
        sink.emit(&sample_profile(3)).unwrap();
        sink.finish().unwrap();

        let written = std::fs::read_to_string(path).unwrap();
        assert!(written.starts_with("=== Vehicle 1 | PKW | Kompaktklasse ==="));
    }
}
