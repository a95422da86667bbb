use std::io;

/// Set of cores a thread may run on
#[derive(Clone, Copy)]
pub struct AffinityMask {
    #[cfg(target_os = "linux")]
    set: libc::cpu_set_t,
}

#[cfg(target_os = "linux")]
#[allow(unused_unsafe)]
impl AffinityMask {
    /// Largest number of cores a mask can describe
    pub const CAPACITY: usize = libc::CPU_SETSIZE as usize;

    /// Mask of the calling thread
    pub fn current() -> io::Result<Self> {
        let mut set = empty_set();

        // SAFETY: `set` is a valid, writable cpu_set_t of the size passed.
        let rc = unsafe {
            libc::sched_getaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &mut set)
        };

        if rc != 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self { set })
    }

    /// Mask containing only `core`
    pub fn single(core: usize) -> Option<Self> {
        if core >= Self::CAPACITY {
            return None;
        }

        let mut set = empty_set();
        // SAFETY: `core` is below CPU_SETSIZE.
        unsafe { libc::CPU_SET(core, &mut set) };

        Some(Self { set })
    }

    /// Apply this mask to the calling thread
    pub fn apply(&self) -> io::Result<()> {
        // SAFETY: `self.set` is a valid cpu_set_t of the size passed.
        let rc = unsafe {
            libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &self.set)
        };

        if rc != 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }

    pub fn contains(&self, core: usize) -> bool {
        // SAFETY: bounds are checked before touching the set.
        core < Self::CAPACITY && unsafe { libc::CPU_ISSET(core, &self.set) }
    }

    /// Number of cores in the mask
    pub fn count(&self) -> usize {
        self.cores().count()
    }

    /// Lowest core in the mask
    pub fn first(&self) -> Option<usize> {
        self.cores().next()
    }

    /// Cores in the mask, ascending
    pub fn cores(&self) -> impl Iterator<Item = usize> + '_ {
        (0..Self::CAPACITY).filter(|&core| self.contains(core))
    }
}

#[cfg(target_os = "linux")]
fn empty_set() -> libc::cpu_set_t {
    // SAFETY: cpu_set_t is a plain bit array; all zeroes is the empty set.
    unsafe { std::mem::zeroed() }
}

#[cfg(not(target_os = "linux"))]
impl AffinityMask {
    pub const CAPACITY: usize = 0;

    pub fn current() -> io::Result<Self> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }

    pub fn single(_core: usize) -> Option<Self> {
        None
    }

    pub fn apply(&self) -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }

    pub fn contains(&self, _core: usize) -> bool {
        false
    }

    pub fn count(&self) -> usize {
        0
    }

    pub fn first(&self) -> Option<usize> {
        None
    }

    pub fn cores(&self) -> impl Iterator<Item = usize> + '_ {
        std::iter::empty()
    }
}

impl PartialEq for AffinityMask {
    fn eq(&self, other: &Self) -> bool {
        self.cores().eq(other.cores())
    }
}

impl Eq for AffinityMask {}

impl std::fmt::Debug for AffinityMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.cores()).finish()
    }
}
