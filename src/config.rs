use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result, ensure};
use log::Level;
use pesaudio::process::config::{Configuration, SubStreamFilter};
use serde::Deserialize;

use crate::cli::command::{Cli, StreamArgs};

/// Collator settings read from a YAML file. Absent keys keep their defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    ignore_codes: Option<CodeRange>,
    #[serde(default)]
    max_frame_size: Option<usize>,
    #[serde(default)]
    accumulation_capacity: Option<usize>,
    #[serde(default)]
    max_pooled_buffers: Option<usize>,
    #[serde(default)]
    control_data: Option<bool>,
    #[serde(default)]
    pass_private_data: Option<bool>,
    #[serde(default)]
    sub_stream_filter: Option<FilterEntry>,
    #[serde(default)]
    strict: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct CodeRange {
    first: u8,
    last: u8,
}

#[derive(Debug, Deserialize)]
struct FilterEntry {
    mask: u8,
    code: u8,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Cannot open configuration {}", path.display()))?;
        serde_yaml_ng::from_reader(BufReader::new(file))
            .with_context(|| format!("Invalid configuration {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml_ng::from_str(text)?)
    }

    pub fn apply(self, mut config: Configuration) -> Result<Configuration> {
        if let Some(range) = self.ignore_codes {
            ensure!(
                range.first <= range.last,
                "Ignore range {:#04X}..={:#04X} is empty",
                range.first,
                range.last
            );
            config.ignore_codes = range.first..=range.last;
        }
        if let Some(size) = self.max_frame_size {
            config.max_frame_size = size;
        }
        if let Some(capacity) = self.accumulation_capacity {
            config.accumulation_capacity = capacity;
        }
        if let Some(count) = self.max_pooled_buffers {
            config.max_pooled_buffers = count;
        }
        if let Some(enabled) = self.control_data {
            config.control_data = enabled;
        }
        if let Some(enabled) = self.pass_private_data {
            config.pass_private_data = enabled;
        }
        if let Some(FilterEntry { mask, code }) = self.sub_stream_filter {
            config.sub_stream_filter = Some(SubStreamFilter { mask, code });
        }
        if self.strict == Some(true) {
            config = config.strict();
        }

        Ok(config)
    }
}

/// Builds the collator configuration: defaults, then the file, then the flags.
pub fn resolve(cli: &Cli, stream: &StreamArgs) -> Result<Configuration> {
    let mut config = match &cli.config {
        Some(path) => ConfigFile::load(path)?.apply(Configuration::default())?,
        None => Configuration::default(),
    };

    if stream.control_data {
        config.control_data = true;
    }
    if stream.pass_private_data {
        config.pass_private_data = true;
    }
    if let Some(filter) = stream.stream_id_filter {
        config.sub_stream_filter = Some(filter);
    }

    // Configure fail level based on strict mode
    if cli.strict {
        config.fail_level = Level::Warn;
    }

    config.validate()?;
    Ok(config)
}

#[test]
fn yaml_overrides_defaults() -> Result<()> {
    let file = ConfigFile::from_yaml(
        "maxFrameSize: 4096\n\
         controlData: true\n\
         ignoreCodes: { first: 0, last: 0xBB }\n\
         subStreamFilter: { mask: 0xF8, code: 0x80 }\n",
    )?;
    let config = file.apply(Configuration::default())?;

    assert_eq!(config.max_frame_size, 4096);
    assert!(config.control_data);
    assert!(!config.pass_private_data);
    assert_eq!(config.ignore_codes, 0x00..=0xBB);
    assert_eq!(
        config.sub_stream_filter,
        Some(SubStreamFilter {
            mask: 0xF8,
            code: 0x80
        })
    );
    assert_eq!(config.fail_level, Level::Error);
    Ok(())
}

#[test]
fn yaml_rejects_bad_input() -> Result<()> {
    assert!(ConfigFile::from_yaml("maxFrameSiz: 1\n").is_err());

    let file = ConfigFile::from_yaml("ignoreCodes: { first: 0xC0, last: 0x10 }\n")?;
    assert!(file.apply(Configuration::default()).is_err());

    let config = ConfigFile::from_yaml("strict: true\n")?.apply(Configuration::default())?;
    assert_eq!(config.fail_level, Level::Warn);
    Ok(())
}
