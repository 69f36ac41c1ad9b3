use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use radar_api::{StorageError, StoredId, TrackEvent, TrackStorage};

use super::config::{FileStorageConfig, IdOnly};

// ════════════════════════════════════════════════════════════════
//  FileState — всё, что меняет append
// ════════════════════════════════════════════════════════════════

struct FileState {
    file: File,
    /// Длина префикса файла, состоящего только из целых строк.
    committed: u64,
    next_id: u64,
    sync: bool,
}

impl FileState {
    fn append(&mut self, mut record: TrackEvent) -> Result<StoredId, StorageError> {
        let id = StoredId(self.next_id);
        record.id = Some(id);
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        if let Err(e) = self.write_line(&line) {
            // Откатить недописанный хвост, иначе следующая строка склеится с ним.
            let _ = self.file.set_len(self.committed);
            return Err(e);
        }

        self.committed += line.len() as u64;
        self.next_id += 1;
        Ok(id)
    }

    fn write_line(&mut self, line: &[u8]) -> Result<(), StorageError> {
        self.file
            .seek(SeekFrom::Start(self.committed))
            .map_err(|e| StorageError::io(format!("seek: {e}")))?;
        self.file
            .write_all(line)
            .map_err(|e| StorageError::io(format!("write: {e}")))?;
        if self.sync {
            self.file
                .sync_data()
                .map_err(|e| StorageError::io(format!("fsync: {e}")))?;
        }
        Ok(())
    }
}

// ════════════════════════════════════════════════════════════════
//  FileStorage
// ════════════════════════════════════════════════════════════════

/// Append-only JSON Lines хранилище: одна строка — один сохранённый
/// трек с `_id`. Запись и чтение выполняются на blocking pool.
#[derive(Clone)]
pub struct FileStorage {
    path: PathBuf,
    state: Arc<Mutex<FileState>>,
}

impl FileStorage {
    /// Открыть (или создать) файл и восстановить счётчик id.
    ///
    /// Недописанная последняя строка (обрыв при падении) отрезается.
    pub fn open(path: impl AsRef<Path>, sync: bool) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::io(format!("mkdir {}: {e}", parent.display())))?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| StorageError::io(format!("open {}: {e}", path.display())))?;

        let (committed, last_id) = scan(&mut file, &path)?;
        let len = file
            .metadata()
            .map_err(|e| StorageError::io(format!("stat {}: {e}", path.display())))?
            .len();
        if len > committed {
            tracing::warn!(
                path = %path.display(),
                dropped_bytes = len - committed,
                "truncating torn record at end of file"
            );
            file.set_len(committed)
                .map_err(|e| StorageError::io(format!("truncate {}: {e}", path.display())))?;
        }

        tracing::info!(path = %path.display(), next_id = last_id + 1, sync, "opened track file");
        Ok(Self {
            path,
            state: Arc::new(Mutex::new(FileState {
                file,
                committed,
                next_id: last_id + 1,
                sync,
            })),
        })
    }

    pub fn from_config(config: &FileStorageConfig) -> Result<Self, StorageError> {
        Self::open(&config.path, config.sync)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn committed(&self) -> u64 {
        lock(&self.state).committed
    }
}

// ════════════════════════════════════════════════════════════════
//  TrackStorage impl
// ════════════════════════════════════════════════════════════════

impl TrackStorage for FileStorage {
    fn append(
        &self,
        record: &TrackEvent,
    ) -> Pin<Box<dyn Future<Output = Result<StoredId, StorageError>> + Send + '_>> {
        let record = record.clone();
        let state = self.state.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || lock(&state).append(record))
                .await
                .map_err(|e| StorageError::unavailable(format!("append task: {e}")))?
        })
    }

    fn fetch_recent(
        &self,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<TrackEvent>, StorageError>> + Send + '_>> {
        let this = self.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || {
                let committed = this.committed();
                read_recent(&this.path, committed, limit)
            })
            .await
            .map_err(|e| StorageError::unavailable(format!("read task: {e}")))?
        })
    }

    fn flush(&self) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + '_>> {
        let state = self.state.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || {
                lock(&state)
                    .file
                    .sync_all()
                    .map_err(|e| StorageError::io(format!("fsync: {e}")))
            })
            .await
            .map_err(|e| StorageError::unavailable(format!("flush task: {e}")))?
        })
    }
}

// ════════════════════════════════════════════════════════════════
//  Helpers
// ════════════════════════════════════════════════════════════════

fn lock(state: &Mutex<FileState>) -> MutexGuard<'_, FileState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Пройти файл целиком: длина префикса из целых строк и максимальный `_id`.
fn scan(file: &mut File, path: &Path) -> Result<(u64, u64), StorageError> {
    file.seek(SeekFrom::Start(0))
        .map_err(|e| StorageError::io(format!("seek {}: {e}", path.display())))?;
    let mut reader = BufReader::new(&*file);
    let mut committed = 0u64;
    let mut last_id = 0u64;
    let mut line = Vec::new();

    loop {
        line.clear();
        let n = reader
            .read_until(b'\n', &mut line)
            .map_err(|e| StorageError::io(format!("read {}: {e}", path.display())))?;
        if n == 0 || line.last() != Some(&b'\n') {
            break;
        }
        committed += n as u64;
        match serde_json::from_slice::<IdOnly>(&line) {
            Ok(rec) => last_id = last_id.max(rec.id),
            Err(_) if line.trim_ascii().is_empty() => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), offset = committed - n as u64, error = %e, "skipping corrupt record");
            }
        }
    }
    Ok((committed, last_id))
}

/// Блок обратного чтения хвоста файла.
const TAIL_BLOCK: u64 = 64 * 1024;

/// Последние `limit` записей из первых `committed` байт, от новых к старым.
fn read_recent(path: &Path, committed: u64, limit: usize) -> Result<Vec<TrackEvent>, StorageError> {
    if limit == 0 || committed == 0 {
        return Ok(Vec::new());
    }
    let mut file = File::open(path)
        .map_err(|e| StorageError::io(format!("open {}: {e}", path.display())))?;
    read_tail(&mut file, committed, limit, TAIL_BLOCK)
        .map_err(|e| StorageError::io(format!("read {}: {e}", path.display())))
}

/// Читает блоками от `committed` к началу, пока не наберёт `limit` записей.
///
/// Строка, начало которой ещё не прочитано, переносится в следующий блок.
fn read_tail<R: Read + Seek>(
    reader: &mut R,
    committed: u64,
    limit: usize,
    block: u64,
) -> std::io::Result<Vec<TrackEvent>> {
    let block = block.max(1);
    let mut out = Vec::with_capacity(limit.min(4096));
    let mut carry: Vec<u8> = Vec::new();
    let mut pos = committed;

    while pos > 0 && out.len() < limit {
        let start = pos.saturating_sub(block);
        let mut chunk = vec![0u8; (pos - start) as usize];
        reader.seek(SeekFrom::Start(start))?;
        reader.read_exact(&mut chunk)?;
        chunk.extend_from_slice(&carry);
        pos = start;

        let mut lines: Vec<&[u8]> = chunk.rsplit(|b| *b == b'\n').collect();
        carry = if pos > 0 {
            lines.pop().map(<[u8]>::to_vec).unwrap_or_default()
        } else {
            Vec::new()
        };

        for line in lines {
            if line.trim_ascii().is_empty() {
                continue;
            }
            match serde_json::from_slice::<TrackEvent>(line) {
                Ok(record) => {
                    out.push(record);
                    if out.len() == limit {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(offset = pos, error = %e, "skipping corrupt record");
                }
            }
        }
    }
    Ok(out)
}
