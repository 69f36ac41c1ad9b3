// ════════════════════════════════════════════════════════════════
//  Configuration
// ════════════════════════════════════════════════════════════════

fn default_sync() -> bool {
    true
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct FileStorageConfig {
    /// Путь к JSON Lines файлу. Родительские каталоги создаются.
    pub path: String,
    /// `fsync` после каждого append. Без него `Ok` от append означает
    /// только «записано в page cache».
    #[serde(default = "default_sync")]
    pub sync: bool,
}

// ════════════════════════════════════════════════════════════════
//  On-disk record format
// ════════════════════════════════════════════════════════════════

/// Достаточно для восстановления счётчика id при открытии.
#[derive(serde::Deserialize)]
pub(crate) struct IdOnly {
    #[serde(rename = "_id")]
    pub id: u64,
}
