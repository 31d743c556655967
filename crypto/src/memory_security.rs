//! Memory locking for secret material.
//!
//! Trimmed from the teacher's `crypto::memory_security` (which also offered
//! `mprotect` read-only toggling and guard-page allocation for buffer
//! overflow detection): the token service's passphrases and derived keys
//! are fixed-size, short-lived, and never require either, so only memory
//! locking (`mlock`/`VirtualLock`) plus the zeroizing wrapper are kept.

use zeroize::{Zeroize, Zeroizing};

#[cfg(unix)]
use libc::{mlock, munlock};

#[cfg(windows)]
use winapi::um::memoryapi::{VirtualLock, VirtualUnlock};

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("failed to lock memory: {0}")]
    LockFailed(String),

    #[error("failed to unlock memory: {0}")]
    UnlockFailed(String),

    #[error("memory locking not supported on this platform")]
    NotSupported,
}

pub type MemoryResult<T> = Result<T, MemoryError>;

/// Lock memory to prevent it from being swapped to disk. Best-effort:
/// callers should continue (with a logged warning) if this fails, rather
/// than refuse to hold the key at all.
#[cfg(unix)]
pub fn lock_memory(data: &[u8]) -> MemoryResult<()> {
    if data.is_empty() {
        return Ok(());
    }
    unsafe {
        let result = mlock(data.as_ptr() as *const libc::c_void, data.len());
        if result == 0 {
            Ok(())
        } else {
            Err(MemoryError::LockFailed(std::io::Error::last_os_error().to_string()))
        }
    }
}

#[cfg(windows)]
pub fn lock_memory(data: &[u8]) -> MemoryResult<()> {
    if data.is_empty() {
        return Ok(());
    }
    unsafe {
        let result = VirtualLock(data.as_ptr() as *mut winapi::ctypes::c_void, data.len());
        if result != 0 {
            Ok(())
        } else {
            Err(MemoryError::LockFailed("VirtualLock failed".to_string()))
        }
    }
}

#[cfg(not(any(unix, windows)))]
pub fn lock_memory(_data: &[u8]) -> MemoryResult<()> {
    Err(MemoryError::NotSupported)
}

#[cfg(unix)]
pub fn unlock_memory(data: &[u8]) -> MemoryResult<()> {
    if data.is_empty() {
        return Ok(());
    }
    unsafe {
        let result = munlock(data.as_ptr() as *const libc::c_void, data.len());
        if result == 0 {
            Ok(())
        } else {
            Err(MemoryError::UnlockFailed(std::io::Error::last_os_error().to_string()))
        }
    }
}

#[cfg(windows)]
pub fn unlock_memory(data: &[u8]) -> MemoryResult<()> {
    if data.is_empty() {
        return Ok(());
    }
    unsafe {
        let result = VirtualUnlock(data.as_ptr() as *mut winapi::ctypes::c_void, data.len());
        if result != 0 {
            Ok(())
        } else {
            Err(MemoryError::UnlockFailed("VirtualUnlock failed".to_string()))
        }
    }
}

#[cfg(not(any(unix, windows)))]
pub fn unlock_memory(_data: &[u8]) -> MemoryResult<()> {
    Err(MemoryError::NotSupported)
}

/// A locked, zeroize-on-drop byte buffer. The recommended way to hold a
/// passphrase or derived key in memory.
pub struct SecureMemory {
    data: Zeroizing<Vec<u8>>,
    locked: bool,
}

impl SecureMemory {
    pub fn new(data: Vec<u8>) -> Self {
        let locked = lock_memory(&data).is_ok();
        Self {
            data: Zeroizing::new(data),
            locked,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Drop for SecureMemory {
    fn drop(&mut self) {
        self.data.zeroize();
        if self.locked {
            let _ = unlock_memory(&self.data);
        }
    }
}

impl AsRef<[u8]> for SecureMemory {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}
