//! Runtime backend selection.
//!
//! The CPU is probed once per process; a [`Dispatcher`] then pins one
//! resolved [`Backend`] and routes every transpose through it.

use std::sync::OnceLock;

use log::debug;
use serde::Serialize;

use crate::backend::Backend;
use crate::bit_transpose;
use crate::byte_transpose;
use crate::cpu_detect;
use crate::error::Result;
use crate::kernel::Tile;

/// What the running process can do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    /// True when the selected backend is the bit-by-bit reference.
    pub scalar: bool,
    pub backend_name: String,
    pub available_backends: Vec<String>,
    pub sse2: bool,
    pub avx2: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatcher {
    backend: Backend,
}

impl Dispatcher {
    /// Select the widest backend the CPU supports.
    pub fn detect() -> Self {
        let backend = Backend::best();
        debug!("selected {backend} transpose backend");
        Dispatcher { backend }
    }

    /// Use `requested`, or the next narrower backend if the CPU lacks it.
    pub fn with_backend(requested: Backend) -> Self {
        let backend = requested.resolve();
        if backend != requested {
            debug!("{requested} backend unavailable, using {backend}");
        }
        Dispatcher { backend }
    }

    /// Process-wide dispatcher, probed on first use.
    pub fn global() -> &'static Dispatcher {
        static GLOBAL: OnceLock<Dispatcher> = OnceLock::new();
        GLOBAL.get_or_init(Dispatcher::detect)
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            scalar: self.backend == Backend::Scalar,
            backend_name: self.backend.name().to_string(),
            available_backends: Backend::available()
                .into_iter()
                .map(|b| b.name().to_string())
                .collect(),
            sse2: cpu_detect::has_sse2(),
            avx2: cpu_detect::has_avx2(),
        }
    }

    /// Transpose both 8x8 bit matrices of a 16-byte tile.
    pub fn transpose_tile(&self, tile: &Tile) -> Tile {
        self.backend.transpose_tile(tile)
    }

    pub fn transpose_bytes(&self, input: &[u8], n: usize, itemsize: usize) -> Result<Vec<u8>> {
        byte_transpose::transpose_bytes(self.backend, input, n, itemsize)
    }

    pub fn untranspose_bytes(&self, input: &[u8], n: usize, itemsize: usize) -> Result<Vec<u8>> {
        byte_transpose::untranspose_bytes(self.backend, input, n, itemsize)
    }

    pub fn transpose_bits(&self, input: &[u8], n: usize, itemsize: usize) -> Result<Vec<u8>> {
        bit_transpose::transpose_bits(self.backend, input, n, itemsize)
    }

    pub fn untranspose_bits(&self, input: &[u8], n: usize, itemsize: usize) -> Result<Vec<u8>> {
        bit_transpose::untranspose_bits(self.backend, input, n, itemsize)
    }

    /// Unchecked forward bit transpose for the block pipeline.
    pub(crate) fn transpose_bits_into(&self, input: &[u8], out: &mut [u8], n: usize, itemsize: usize) {
        bit_transpose::trans_bit_elem_into(self.backend, input, out, n, itemsize);
    }

    pub(crate) fn untranspose_bits_into(
        &self,
        input: &[u8],
        out: &mut [u8],
        n: usize,
        itemsize: usize,
    ) {
        bit_transpose::untrans_bit_elem_into(self.backend, input, out, n, itemsize);
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        *Self::global()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_is_stable() {
        let a = Dispatcher::global();
        let b = Dispatcher::global();
        assert!(std::ptr::eq(a, b));
        assert_eq!(a.backend(), Backend::best());
    }

    #[test]
    fn forced_scalar_reports_scalar() {
        let caps = Dispatcher::with_backend(Backend::Scalar).capabilities();
        assert!(caps.scalar);
        assert_eq!(caps.backend_name, "scalar");
        assert!(caps.available_backends.contains(&"wide8".to_string()));
    }

    #[test]
    fn unavailable_request_degrades() {
        let d = Dispatcher::with_backend(Backend::Wide32);
        assert!(d.backend().is_available());
        assert!(d.backend() <= Backend::Wide32);
    }

    #[test]
    fn concurrent_first_use_sees_one_backend() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| Dispatcher::global().backend()))
            .collect();
        let seen: Vec<Backend> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(seen.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn capabilities_serialize() {
        let json = serde_json::to_value(Dispatcher::global().capabilities()).unwrap();
        assert!(json["backend_name"].is_string());
        assert!(json["available_backends"].is_array());
    }
}
