//! Byte buffers crossing the ABI.
//!
//! `StringBuffer` borrows caller memory for the duration of one call.
//! `ByteBuffer` is allocated by the engine and owned by whoever receives
//! it; it must be handed back to the engine's free function exactly once.
//! [`NativeBuffer`] enforces that with `Drop`.
//!
//! Lengths travel as `i32`; anything longer than `i32::MAX` bytes cannot
//! be described and is refused instead of truncated.

use std::mem::ManuallyDrop;
use std::ptr::NonNull;

/// `len` as the ABI carries it, or `None` if it does not fit.
pub fn abi_len(len: usize) -> Option<i32> {
    i32::try_from(len).ok()
}

/// Engine-allocated bytes.
#[repr(C)]
#[derive(Debug)]
pub struct ByteBuffer {
    ptr: *mut u8,
    length: i32,
    capacity: i32,
}

impl ByteBuffer {
    /// Leak a vector into a buffer. Reclaim it with [`ByteBuffer::destroy`].
    /// A vector too large for the ABI is dropped and `None` returned.
    pub fn from_vec(bytes: Vec<u8>) -> Option<Self> {
        let length = abi_len(bytes.len())?;
        let capacity = abi_len(bytes.capacity())?;
        let mut bytes = ManuallyDrop::new(bytes);
        Some(Self { ptr: bytes.as_mut_ptr(), length, capacity })
    }

    pub fn len(&self) -> usize {
        self.length.max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        if self.ptr.is_null() || self.length <= 0 {
            return &[];
        }
        // SAFETY: ptr/length describe a live allocation created by `from_vec`.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len()) }
    }

    /// # Safety
    /// The buffer must have been produced by [`ByteBuffer::from_vec`] and
    /// not destroyed before.
    pub unsafe fn destroy(self) {
        if !self.ptr.is_null() {
            drop(Vec::from_raw_parts(
                self.ptr,
                self.length.max(0) as usize,
                self.capacity.max(0) as usize,
            ));
        }
    }
}

/// Borrowed UTF-8 (or raw) bytes passed into a native setter.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct StringBuffer {
    ptr: *const u8,
    length: i32,
}

impl StringBuffer {
    /// Borrow `bytes`, or `None` if they are too long for the ABI.
    pub fn new(bytes: &[u8]) -> Option<Self> {
        Some(Self { ptr: bytes.as_ptr(), length: abi_len(bytes.len())? })
    }

    /// # Safety
    /// The memory the buffer was created from must still be alive.
    pub unsafe fn to_bytes<'a>(&self) -> &'a [u8] {
        if self.ptr.is_null() || self.length <= 0 {
            return &[];
        }
        std::slice::from_raw_parts(self.ptr, self.length as usize)
    }
}

/// The engine's `free_byte_buffer` entry point.
pub type FreeByteBuffer = unsafe extern "C" fn(*mut ByteBuffer);

/// An owned engine buffer, released through the engine's free function
/// when dropped.
pub struct NativeBuffer {
    raw: NonNull<ByteBuffer>,
    free: FreeByteBuffer,
}

// The buffer is exclusively owned; nothing else aliases it once returned.
unsafe impl Send for NativeBuffer {}

impl NativeBuffer {
    /// Take ownership of a buffer returned by a native getter. A null
    /// pointer yields `None`.
    ///
    /// # Safety
    /// `raw` must be a live buffer that `free` accepts, and ownership must
    /// not be taken twice.
    pub unsafe fn from_raw(raw: *mut ByteBuffer, free: FreeByteBuffer) -> Option<Self> {
        NonNull::new(raw).map(|raw| Self { raw, free })
    }

    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: the pointer stays valid until `drop` hands it back.
        unsafe { self.raw.as_ref().as_slice() }
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(self.as_bytes()).into_owned()
    }
}

impl Drop for NativeBuffer {
    fn drop(&mut self) {
        // SAFETY: `from_raw` took sole ownership; this is the only release.
        unsafe { (self.free)(self.raw.as_ptr()) }
    }
}

impl std::fmt::Debug for NativeBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeBuffer").field("len", &self.as_bytes().len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static FREED: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn counting_free(buf: *mut ByteBuffer) {
        FREED.fetch_add(1, Ordering::SeqCst);
        Box::from_raw(buf).destroy();
    }

    fn boxed(bytes: &[u8]) -> *mut ByteBuffer {
        Box::into_raw(Box::new(ByteBuffer::from_vec(bytes.to_vec()).unwrap()))
    }

    #[test]
    fn test_byte_buffer_slice() {
        let buf = ByteBuffer::from_vec(b"content-type".to_vec()).unwrap();
        assert_eq!(buf.as_slice(), b"content-type");
        assert_eq!(buf.len(), 12);
        unsafe { buf.destroy() };
    }

    #[test]
    fn test_empty_byte_buffer() {
        let buf = ByteBuffer::from_vec(Vec::new()).unwrap();
        assert!(buf.is_empty());
        assert!(buf.as_slice().is_empty());
        unsafe { buf.destroy() };
    }

    #[test]
    fn test_string_buffer_borrows() {
        let data = b"GET".to_vec();
        let sb = StringBuffer::new(&data).unwrap();
        assert_eq!(unsafe { sb.to_bytes() }, b"GET");
    }

    #[test]
    fn test_abi_len_refuses_oversized_lengths() {
        assert_eq!(abi_len(0), Some(0));
        assert_eq!(abi_len(i32::MAX as usize), Some(i32::MAX));
        assert_eq!(abi_len(i32::MAX as usize + 1), None);
        assert_eq!(abi_len(u32::MAX as usize), None);
    }

    #[test]
    fn test_native_buffer_frees_once() {
        let before = FREED.load(Ordering::SeqCst);
        {
            let buf = unsafe { NativeBuffer::from_raw(boxed(b"x-trace"), counting_free) }.unwrap();
            assert_eq!(buf.as_bytes(), b"x-trace");
            assert_eq!(buf.to_string_lossy(), "x-trace");
        }
        assert_eq!(FREED.load(Ordering::SeqCst), before + 1);
    }

    #[test]
    fn test_native_buffer_null_is_none() {
        let buf = unsafe { NativeBuffer::from_raw(std::ptr::null_mut(), counting_free) };
        assert!(buf.is_none());
    }
}
