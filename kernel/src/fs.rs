//! File system collaborator.
//!
//! The kernel only needs the five calls of [`FileSystem`]. The in-memory
//! implementation serves tests and the demo, and also provides the console
//! on handles 0 and 1.

use std::collections::VecDeque;
use std::sync::Arc;

use hashbrown::HashMap;
use spin::Mutex;

/// Handle of an open file, as seen by user programs.
pub type OpenFileId = i32;

/// Console input handle.
pub const CONSOLE_INPUT: OpenFileId = 0;

/// Console output handle.
pub const CONSOLE_OUTPUT: OpenFileId = 1;

/// File operations the kernel forwards from system calls.
pub trait FileSystem: Send {
    /// Create an empty file. Returns `false` if it cannot be created.
    fn create(&mut self, path: &str) -> bool;

    /// Open an existing file.
    fn open(&mut self, path: &str) -> Option<OpenFileId>;

    /// Close an open file. Unknown handles are ignored.
    fn close(&mut self, id: OpenFileId);

    /// Whether `id` names the console or an open file.
    fn is_open(&self, id: OpenFileId) -> bool;

    /// Read up to `buf.len()` bytes. `None` for a bad handle.
    fn read(&mut self, id: OpenFileId, buf: &mut [u8]) -> Option<usize>;

    /// Write `buf`. `None` for a bad handle.
    fn write(&mut self, id: OpenFileId, buf: &[u8]) -> Option<usize>;
}

#[derive(Debug, Default)]
struct OpenFile {
    path: String,
    position: usize,
}

#[derive(Debug, Default)]
struct MemFsInner {
    files: HashMap<String, Vec<u8>>,
    open: HashMap<OpenFileId, OpenFile>,
    next_id: OpenFileId,
    console_input: VecDeque<u8>,
    console_output: Vec<u8>,
}

/// An in-memory file system with a console.
///
/// Clones share the same contents, so a test can keep a handle after
/// handing one to the kernel.
#[derive(Debug, Clone)]
pub struct MemFileSystem {
    inner: Arc<Mutex<MemFsInner>>,
}

impl MemFileSystem {
    pub fn new() -> Self {
        MemFileSystem {
            inner: Arc::new(Mutex::new(MemFsInner {
                next_id: CONSOLE_OUTPUT + 1,
                ..MemFsInner::default()
            })),
        }
    }

    /// Queue bytes for console reads.
    pub fn push_console_input(&self, bytes: &[u8]) {
        self.inner.lock().console_input.extend(bytes.iter().copied());
    }

    /// Everything written to the console so far.
    pub fn console_output(&self) -> Vec<u8> {
        self.inner.lock().console_output.clone()
    }

    /// Contents of a file, if it exists.
    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.inner.lock().files.get(path).cloned()
    }

    pub fn exists(&self, path: &str) -> bool {
        self.inner.lock().files.contains_key(path)
    }

    /// Number of open file handles, excluding the console.
    pub fn open_count(&self) -> usize {
        self.inner.lock().open.len()
    }
}

impl Default for MemFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for MemFileSystem {
    fn create(&mut self, path: &str) -> bool {
        if path.is_empty() {
            return false;
        }
        let mut inner = self.inner.lock();
        inner.files.insert(path.to_string(), Vec::new());
        log::debug!("[FS] created {}", path);
        true
    }

    fn open(&mut self, path: &str) -> Option<OpenFileId> {
        let mut inner = self.inner.lock();
        if !inner.files.contains_key(path) {
            return None;
        }
        let id = inner.next_id;
        inner.next_id += 1;
        inner.open.insert(
            id,
            OpenFile {
                path: path.to_string(),
                position: 0,
            },
        );
        log::debug!("[FS] opened {} as {}", path, id);
        Some(id)
    }

    fn close(&mut self, id: OpenFileId) {
        if self.inner.lock().open.remove(&id).is_some() {
            log::debug!("[FS] closed {}", id);
        }
    }

    fn is_open(&self, id: OpenFileId) -> bool {
        id == CONSOLE_INPUT || id == CONSOLE_OUTPUT || self.inner.lock().open.contains_key(&id)
    }

    fn read(&mut self, id: OpenFileId, buf: &mut [u8]) -> Option<usize> {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        if id == CONSOLE_INPUT {
            let n = buf.len().min(inner.console_input.len());
            for (dst, src) in buf.iter_mut().zip(inner.console_input.drain(..n)) {
                *dst = src;
            }
            return Some(n);
        }
        let file = inner.open.get_mut(&id)?;
        let data = inner.files.get(&file.path)?;
        let start = file.position.min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        file.position = start + n;
        Some(n)
    }

    fn write(&mut self, id: OpenFileId, buf: &[u8]) -> Option<usize> {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        if id == CONSOLE_OUTPUT {
            inner.console_output.extend_from_slice(buf);
            return Some(buf.len());
        }
        let file = inner.open.get_mut(&id)?;
        let data = inner.files.get_mut(&file.path)?;
        let start = file.position.min(data.len());
        let end = start + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        file.position = end;
        Some(buf.len())
    }
}
