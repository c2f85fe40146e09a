use crate::error::ConfigError;
use serde::Deserialize;
use std::{fs, path::Path};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerSection,
    pub storage: StorageSection,
    pub ocr: OcrSection,
    pub vision: VisionSection,
    pub writer: WriterSection,
    pub warehouse: WarehouseSection,
    pub kpi: KpiSection,
}

/// Upload size cap when the config does not set one.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
    pub max_upload_bytes: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Files under `root/bucket/` on local disk.
    Fs,
    /// S3-compatible `PUT` against `endpoint`.
    Http,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub backend: StorageBackend,
    pub bucket: String,
    /// Informational only: logged at startup, never sent. The HTTP backend
    /// issues unsigned PUTs.
    pub region: String,
    pub root: String,
    pub endpoint: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Fs,
            bucket: "waste-ledger-demo".to_string(),
            region: "us-west-2".to_string(),
            root: "objectstore".to_string(),
            endpoint: "http://localhost:9000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrBackend {
    /// Read the text layer of PDF uploads locally.
    Pdf,
    /// POST the document to a remote OCR endpoint.
    Remote,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OcrSection {
    pub backend: OcrBackend,
    pub url: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for OcrSection {
    fn default() -> Self {
        Self {
            backend: OcrBackend::Pdf,
            url: "http://localhost:8501/detect-text".to_string(),
            api_key_env: "OCR_API_KEY".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VisionSection {
    /// OpenAI-compatible base URL (`.../v1`).
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub timeout_secs: u64,
}

impl Default for VisionSection {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            model: "llama3.2-vision:11b".to_string(),
            api_key_env: "VISION_API_KEY".to_string(),
            max_tokens: 400,
            temperature: 0.2,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WriterSection {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for WriterSection {
    fn default() -> Self {
        Self {
            base_url: "https://api.writer.com/v1".to_string(),
            model: "palmyra-x5".to_string(),
            api_key_env: "WRITER_API_KEY".to_string(),
            timeout_secs: 12,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WarehouseSection {
    pub db_path: String,
}

impl Default for WarehouseSection {
    fn default() -> Self {
        Self {
            db_path: "warehouse/waste_ledger.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KpiSection {
    /// Rehydrate the in-memory totals from the warehouse view at startup.
    pub seed_from_warehouse: bool,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

/// Read a secret from the environment variable named in the config.
/// Empty values count as missing.
pub fn secret_from_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}
