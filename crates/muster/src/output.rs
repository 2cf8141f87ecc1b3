use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Pprint,
    Yaml,
    Json,
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Format::Pprint => write!(f, "pprint"),
            Format::Yaml => write!(f, "yaml"),
            Format::Json => write!(f, "json"),
        }
    }
}

/// Render a serializable value in the requested format.
pub fn render<T: serde::Serialize>(value: &T, format: Format) -> anyhow::Result<String> {
    let value = serde_json::to_value(value)?;
    Ok(match format {
        Format::Pprint => format!("{:#?}", value),
        Format::Yaml => serde_yaml::to_string(&value)?,
        Format::Json => serde_json::to_string_pretty(&value)?,
    })
}
