//! Shared Memory Buffers
//!
//! Mode lists come back from the compositor through a `wl_buffer` the client
//! allocates. The backing store is an anonymous memfd mapped read/write into
//! this process; the compositor maps the same fd through `wl_shm_pool` and
//! writes an [`HdmiInfos`](crate::wire::HdmiInfos) record at offset 0.
//!
//! Both the mapping and the protocol objects are released on drop.

use std::fs::File;
use std::io;
use std::os::fd::{AsFd, BorrowedFd};

use memmap2::{MmapMut, MmapOptions};
use nix::sys::memfd::{memfd_create, MemFdCreateFlag};
use tracing::debug;
use wayland_client::protocol::wl_buffer::WlBuffer;
use wayland_client::protocol::wl_shm::{self, WlShm};
use wayland_client::protocol::wl_shm_pool::WlShmPool;
use wayland_client::{Dispatch, QueueHandle};

use crate::error::{DisplayConfigError, Result};

/// Bytes per XRGB8888 pixel
const BYTES_PER_PIXEL: i32 = 4;

/// Anonymous file mapped into this process
pub struct SharedMemory {
    file: File,
    map: MmapMut,
}

impl SharedMemory {
    /// Create and map a zero-filled anonymous segment of `size` bytes
    pub fn create(size: usize) -> Result<Self> {
        let shm_error = |source: io::Error| DisplayConfigError::Shm { size, source };

        let fd = memfd_create(
            c"weston-displayconfig",
            MemFdCreateFlag::MFD_CLOEXEC | MemFdCreateFlag::MFD_ALLOW_SEALING,
        )
        .map_err(|e| shm_error(e.into()))?;

        let file = File::from(fd);
        file.set_len(size as u64).map_err(shm_error)?;

        // SAFETY: the memfd is private to this process and the compositor; the
        // compositor only writes while a request is outstanding, and we only read
        // after its done event.
        #[allow(unsafe_code)]
        let map = unsafe { MmapOptions::new().len(size).map_mut(&file) }.map_err(shm_error)?;

        debug!("Mapped {} bytes of anonymous shared memory", size);

        Ok(Self { file, map })
    }

    /// Segment size in bytes
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the segment is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Mapped contents
    pub fn contents(&self) -> &[u8] {
        &self.map
    }

    /// Mapped contents, writable
    pub fn contents_mut(&mut self) -> &mut [u8] {
        &mut self.map
    }
}

impl AsFd for SharedMemory {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

/// `wl_buffer` backed by [`SharedMemory`]
pub struct ShmBuffer {
    memory: SharedMemory,
    buffer: WlBuffer,
    width: i32,
    height: i32,
}

impl ShmBuffer {
    /// Allocate a `width` x `height` XRGB8888 buffer
    ///
    /// The intermediate pool is destroyed right away; the compositor keeps
    /// its own reference to the mapping for as long as the buffer lives.
    pub fn new<D>(shm: &WlShm, width: i32, height: i32, qh: &QueueHandle<D>) -> Result<Self>
    where
        D: Dispatch<WlShmPool, ()> + Dispatch<WlBuffer, ()> + 'static,
    {
        let (stride, size) = buffer_layout(width, height)?;
        let memory = SharedMemory::create(size as usize)?;

        let pool = shm.create_pool(memory.as_fd(), size, qh, ());
        let buffer = pool.create_buffer(
            0,
            width,
            height,
            stride,
            wl_shm::Format::Xrgb8888,
            qh,
            (),
        );
        pool.destroy();

        debug!("Created {}x{} shm buffer ({} bytes)", width, height, size);

        Ok(Self {
            memory,
            buffer,
            width,
            height,
        })
    }

    /// Protocol object handed to the compositor
    pub fn wl_buffer(&self) -> &WlBuffer {
        &self.buffer
    }

    /// Buffer dimensions in pixels
    pub fn dimensions(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    /// Bytes the compositor wrote
    pub fn contents(&self) -> &[u8] {
        self.memory.contents()
    }

    /// Zero the buffer so stale data is never mistaken for a fresh answer
    pub fn clear(&mut self) {
        self.memory.contents_mut().fill(0);
    }
}

impl Drop for ShmBuffer {
    fn drop(&mut self) {
        debug!("Destroying {}x{} shm buffer", self.width, self.height);
        self.buffer.destroy();
    }
}

/// Stride and total size for a `width` x `height` XRGB8888 buffer
pub fn buffer_layout(width: i32, height: i32) -> Result<(i32, i32)> {
    if width <= 0 || height <= 0 {
        return Err(DisplayConfigError::Config(format!(
            "Buffer dimensions must be positive, got {}x{}",
            width, height
        )));
    }

    let stride = width.checked_mul(BYTES_PER_PIXEL);
    let size = stride.and_then(|stride| stride.checked_mul(height));
    match (stride, size) {
        (Some(stride), Some(size)) => Ok((stride, size)),
        _ => Err(DisplayConfigError::Config(format!(
            "Buffer of {}x{} pixels is too large",
            width, height
        ))),
    }
}
