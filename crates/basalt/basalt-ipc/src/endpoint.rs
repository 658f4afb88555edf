//! Endpoint lifecycle: attach to the shared file, claim a role, move frames.

use std::io;
use std::path::Path;
use std::ptr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use basalt_mmap::MmapFileMut;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::frame;
use crate::layout::{
    self, GLOBAL_HEADER_LEN, GlobalHeader, MAGIC, RING_HEADER_LEN, RingHeader, SIGN_OFFSET,
    SIGN_OPA, SIGN_OPB, VERSION,
};
use crate::ring::{Ring, RingConfig};

/// Fixed poll interval for blocking send and recv.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Which half of the channel this process claimed at attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    A,
    B,
}

impl Role {
    pub(crate) fn sign_bit(self) -> u32 {
        match self {
            Role::A => SIGN_OPA,
            Role::B => SIGN_OPB,
        }
    }
}

/// One side of the duplex channel.
///
/// The first endpoint to attach to a path claims role A, the second role B;
/// a third attach fails. A produces into ring A and consumes ring B, B is
/// the mirror image, so the two directions never contend. Dropping the
/// endpoint releases its role bit and resets the ring it was reading from.
#[derive(Debug)]
pub struct Endpoint {
    /// Owns the mapping; every raw pointer below points into it.
    mm: MmapFileMut,
    role: Role,
    /// Ring this endpoint produces into (its `in` cursor is ours).
    send_ring: Ring,
    /// Ring this endpoint consumes from (its `out` cursor is ours).
    recv_ring: Ring,
}

// SAFETY: the endpoint owns its mapping and every pointer dereference stays
// inside it; moving the endpoint to another thread moves that ownership
// along. No shared (&self) mutation exists, so Sync is neither needed nor
// claimed.
unsafe impl Send for Endpoint {}

impl Endpoint {
    /// Attach to the channel at `path`, creating and laying out the backing
    /// file if it does not exist yet.
    ///
    /// `cfg.payload_size` is only consulted when the file is freshly laid
    /// out; attaching to an existing layout adopts the sizes on file.
    ///
    /// # Errors
    /// [`Error::BadMagic`] when the file carries a foreign magic word,
    /// [`Error::InUse`] when both roles are already claimed, and
    /// [`Error::Io`] for mapping failures or a malformed layout.
    pub fn open<P: AsRef<Path>>(path: P, cfg: RingConfig) -> Result<Self> {
        let path = path.as_ref();
        let mut mm = MmapFileMut::open_or_create(path, layout::file_len(cfg.payload_size) as u64)?;

        if mm.len() < GLOBAL_HEADER_LEN {
            return Err(invalid("file shorter than the global header"));
        }

        let base = mm.as_mut_ptr();
        let mut header = read_global_header(base);

        if header.magic == 0 {
            // Created above, or zeroed by hand to recover from a crashed
            // peer. Either way the length must match the requested layout
            // before we write one.
            if mm.len() != layout::file_len(cfg.payload_size) {
                return Err(invalid("uninitialized file length does not match the layout"));
            }
            header = init_layout(base, cfg);
            debug!(payload_size = cfg.payload_size, "channel layout initialized");
        } else if header.magic != MAGIC {
            return Err(Error::BadMagic(header.magic.to_le_bytes()));
        }

        validate_layout(&header, base, mm.len()).map_err(invalid)?;

        let role = claim_role(base)?;
        let (send_base, recv_base) = match role {
            Role::A => (header.base_a, header.base_b),
            Role::B => (header.base_b, header.base_a),
        };
        // SAFETY: validate_layout checked both ring regions lie inside the
        // mapping, which `mm` keeps alive for the endpoint's lifetime
        let send_ring = unsafe { Ring::attach(base.add(send_base as usize)) };
        let recv_ring = unsafe { Ring::attach(base.add(recv_base as usize)) };

        debug!(?role, path = %path.display(), "endpoint attached");

        Ok(Self {
            mm,
            role,
            send_ring,
            recv_ring,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Largest payload a single message can ever carry on this channel.
    pub fn payload_capacity(&self) -> u32 {
        self.send_ring.capacity() - frame::LEN_PREFIX
    }

    /// Queue `data` on the send ring as one length-prefixed frame.
    ///
    /// Returns the payload length on success. With `blocking` unset the call
    /// never sleeps: when the free span is short it returns `Ok(0)` with the
    /// ring untouched. With `blocking` set the cursors are re-read every
    /// 100 ms until the frame fits; `timeout: None` waits indefinitely,
    /// otherwise [`Error::Timeout`] once the deadline passes.
    ///
    /// A payload larger than [`Endpoint::payload_capacity`] can never fit,
    /// so such a call returns 0 forever or blocks until its timeout; that is
    /// a caller bug, not a recoverable state.
    pub fn send(&mut self, data: &[u8], blocking: bool, timeout: Option<Duration>) -> Result<usize> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if frame::push(&self.send_ring, data) {
                return Ok(data.len());
            }
            if !blocking {
                return Ok(0);
            }
            sleep_quantum(deadline)?;
        }
    }

    /// Take the next message off the receive ring.
    ///
    /// `Ok(None)` when `blocking` is unset and the ring is empty; blocking
    /// and timeout behavior mirror [`Endpoint::send`]. Messages arrive in
    /// the exact order the peer sent them.
    pub fn recv(&mut self, blocking: bool, timeout: Option<Duration>) -> Result<Option<Vec<u8>>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if let Some(message) = frame::pop(&self.recv_ring)? {
                return Ok(Some(message));
            }
            if !blocking {
                return Ok(None);
            }
            sleep_quantum(deadline)?;
        }
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        let base = self.mm.as_mut_ptr();
        sign_word(base).fetch_and(!self.role.sign_bit(), Ordering::AcqRel);
        // The ring we were reading from is handed back in a clean state for
        // the next pair; our send ring is left for the peer to drain.
        self.recv_ring.reset_cursors();
        trace!(role = ?self.role, "endpoint detached");
    }
}

/// One blocking wait step: fail once the deadline has passed, otherwise
/// sleep the poll interval, clamped to the time remaining.
fn sleep_quantum(deadline: Option<Instant>) -> Result<()> {
    match deadline {
        Some(deadline) => {
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::Timeout);
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
            Ok(())
        }
        None => {
            thread::sleep(POLL_INTERVAL);
            Ok(())
        }
    }
}

/// Claim the first free role bit with a compare-and-swap on the sign word,
/// so two racing attachers cannot end up with the same role.
fn claim_role(base: *mut u8) -> Result<Role> {
    let sign = sign_word(base);
    loop {
        let current = sign.load(Ordering::Acquire);
        let (role, bit) = if current & SIGN_OPA == 0 {
            (Role::A, SIGN_OPA)
        } else if current & SIGN_OPB == 0 {
            (Role::B, SIGN_OPB)
        } else {
            return Err(Error::InUse);
        };
        if sign
            .compare_exchange(current, current | bit, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return Ok(role);
        }
    }
}

/// Atomic view of the sign word. The rest of the layout has no alignment
/// guarantee, but offset 16 of a page-aligned mapping is always 4-aligned.
fn sign_word<'a>(base: *mut u8) -> &'a AtomicU32 {
    // SAFETY: the caller's mapping covers the global header, and the word is
    // meant to be shared with the peer process
    unsafe { AtomicU32::from_ptr(base.add(SIGN_OFFSET) as *mut u32) }
}

fn read_global_header(base: *mut u8) -> GlobalHeader {
    let mut raw = [0u8; GLOBAL_HEADER_LEN];
    // SAFETY: the caller checked the mapping holds at least the header
    unsafe { ptr::copy_nonoverlapping(base, raw.as_mut_ptr(), GLOBAL_HEADER_LEN) };
    GlobalHeader::decode(&raw)
}

fn read_ring_header(base: *mut u8, at: usize) -> RingHeader {
    let mut raw = [0u8; RING_HEADER_LEN];
    // SAFETY: validate_layout bounds-checks `at` before calling
    unsafe { ptr::copy_nonoverlapping(base.add(at), raw.as_mut_ptr(), RING_HEADER_LEN) };
    RingHeader::decode(&raw)
}

/// Write the global header and both empty ring headers of a fresh layout.
fn init_layout(base: *mut u8, cfg: RingConfig) -> GlobalHeader {
    let header = GlobalHeader::fresh(cfg.payload_size);
    let ring = RingHeader::fresh(cfg.ring_size());
    let global = header.encode();
    let ring_raw = ring.encode();
    // SAFETY: the caller checked the mapping length against the layout, and
    // GlobalHeader::fresh places both rings inside it
    unsafe {
        ptr::copy_nonoverlapping(global.as_ptr(), base, GLOBAL_HEADER_LEN);
        ptr::copy_nonoverlapping(
            ring_raw.as_ptr(),
            base.add(header.base_a as usize),
            RING_HEADER_LEN,
        );
        ptr::copy_nonoverlapping(
            ring_raw.as_ptr(),
            base.add(header.base_b as usize),
            RING_HEADER_LEN,
        );
    }
    header
}

/// Shape checks before any ring pointer is derived from the header: a
/// foreign or truncated file must be rejected, not dereferenced.
fn validate_layout(
    header: &GlobalHeader,
    base: *mut u8,
    map_len: usize,
) -> std::result::Result<(), &'static str> {
    if header.version != VERSION {
        return Err("unsupported layout version");
    }
    for ring_base in [header.base_a, header.base_b] {
        let ring_base = ring_base as usize;
        if ring_base < GLOBAL_HEADER_LEN {
            return Err("ring header overlaps the global header");
        }
        if (ring_base as u64) + (RING_HEADER_LEN as u64) > map_len as u64 {
            return Err("ring header outside the mapping");
        }
        let ring = read_ring_header(base, ring_base);
        if ring.size < 5 {
            return Err("ring too small to carry a frame");
        }
        if (ring_base as u64) + (RING_HEADER_LEN as u64) + u64::from(ring.size) > map_len as u64 {
            return Err("ring data region outside the mapping");
        }
        if ring.in_offset >= ring.size || ring.out_offset >= ring.size {
            return Err("ring cursor outside the ring");
        }
    }
    Ok(())
}

fn invalid(reason: &'static str) -> Error {
    Error::Io(io::Error::new(io::ErrorKind::InvalidData, reason))
}
