//! Per-ISA detection kernels and runtime dispatch.
//!
//! Every backend exposes the same six entry points (Haar f32, LBP f32 and
//! LBP i16, each progressive or interlaced), all producing identical output.
//! [`Kernels::best`] picks the widest instruction set the CPU supports once
//! per process.

use std::sync::OnceLock;

use common::Buffer2;
use serde::{Deserialize, Serialize};

use crate::cascade::{Cascade, HaarCascade, LbpCascade, ScanMode};
use crate::driver::{self, RowBand};
use crate::geometry::Rect;
use crate::integral::Integral;

/// Instruction set of a kernel family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Isa {
    /// One window at a time.
    Base,
    /// Array lanes with no intrinsics (8 x 32-bit, 16 x 16-bit).
    Portable,
    Sse41,
    Avx2,
    Avx512bw,
    Neon,
}

impl Isa {
    /// All families, narrowest first.
    pub const ALL: [Isa; 6] = [
        Isa::Base,
        Isa::Portable,
        Isa::Sse41,
        Isa::Avx2,
        Isa::Avx512bw,
        Isa::Neon,
    ];

    /// `true` if this CPU can run the family.
    pub fn is_supported(self) -> bool {
        match self {
            Isa::Base | Isa::Portable => true,
            Isa::Sse41 => cfg!(target_arch = "x86_64") && common::cpu_features::has_sse4_1(),
            Isa::Avx2 => cfg!(target_arch = "x86_64") && common::cpu_features::has_avx2(),
            Isa::Avx512bw => cfg!(target_arch = "x86_64") && common::cpu_features::has_avx512bw(),
            Isa::Neon => cfg!(target_arch = "aarch64") && common::cpu_features::has_neon(),
        }
    }
}

pub type HaarKernel = fn(&HaarCascade, &Integral, &Buffer2<u8>, Rect, &mut RowBand<'_>);
pub type Lbp32Kernel = fn(&LbpCascade<f32>, &Integral, &Buffer2<u8>, Rect, &mut RowBand<'_>);
pub type Lbp16Kernel = fn(&LbpCascade<i16>, &Integral, &Buffer2<u8>, Rect, &mut RowBand<'_>);

/// One backend's entry points.
///
/// Each kernel evaluates the window origins of `rect` permitted by the mask
/// and writes the band rows it visits. Integral tables must have been
/// [prepared](Integral::prepare) for the cascade.
#[derive(Clone, Copy)]
pub struct Kernels {
    pub isa: Isa,
    pub haar_32fp: HaarKernel,
    pub haar_32fi: HaarKernel,
    pub lbp_32fp: Lbp32Kernel,
    pub lbp_32fi: Lbp32Kernel,
    pub lbp_16ip: Lbp16Kernel,
    pub lbp_16ii: Lbp16Kernel,
}

impl std::fmt::Debug for Kernels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernels").field("isa", &self.isa).finish()
    }
}

/// Generates the six `#[target_feature]` entry points for a pair of lane
/// types.
macro_rules! entry_points {
    ($(#[$attr:meta])* $l32:ty, $l16:ty) => {
        /// # Safety
        ///
        /// The CPU must support this module's instruction set.
        $(#[$attr])*
        pub unsafe fn haar_32fp(c: &HaarCascade, s: &Integral, m: &Buffer2<u8>, r: Rect, d: &mut RowBand<'_>) {
            unsafe { driver::haar_rows::<$l32>(c, s, m, r, d, ScanMode::Progressive) }
        }

        /// # Safety
        ///
        /// The CPU must support this module's instruction set.
        $(#[$attr])*
        pub unsafe fn haar_32fi(c: &HaarCascade, s: &Integral, m: &Buffer2<u8>, r: Rect, d: &mut RowBand<'_>) {
            unsafe { driver::haar_rows::<$l32>(c, s, m, r, d, ScanMode::Interlaced) }
        }

        /// # Safety
        ///
        /// The CPU must support this module's instruction set.
        $(#[$attr])*
        pub unsafe fn lbp_32fp(c: &LbpCascade<f32>, s: &Integral, m: &Buffer2<u8>, r: Rect, d: &mut RowBand<'_>) {
            unsafe { driver::lbp32_rows::<$l32>(c, s, m, r, d, ScanMode::Progressive) }
        }

        /// # Safety
        ///
        /// The CPU must support this module's instruction set.
        $(#[$attr])*
        pub unsafe fn lbp_32fi(c: &LbpCascade<f32>, s: &Integral, m: &Buffer2<u8>, r: Rect, d: &mut RowBand<'_>) {
            unsafe { driver::lbp32_rows::<$l32>(c, s, m, r, d, ScanMode::Interlaced) }
        }

        /// # Safety
        ///
        /// The CPU must support this module's instruction set.
        $(#[$attr])*
        pub unsafe fn lbp_16ip(c: &LbpCascade<i16>, s: &Integral, m: &Buffer2<u8>, r: Rect, d: &mut RowBand<'_>) {
            unsafe { driver::lbp16_rows::<$l16>(c, s, m, r, d, ScanMode::Progressive) }
        }

        /// # Safety
        ///
        /// The CPU must support this module's instruction set.
        $(#[$attr])*
        pub unsafe fn lbp_16ii(c: &LbpCascade<i16>, s: &Integral, m: &Buffer2<u8>, r: Rect, d: &mut RowBand<'_>) {
            unsafe { driver::lbp16_rows::<$l16>(c, s, m, r, d, ScanMode::Interlaced) }
        }
    };
}

/// Safe [`Kernels`] over an `entry_points!` module. Only sound to build once
/// the module's instruction set has been detected.
macro_rules! kernel_table {
    ($isa:expr, $module:ident) => {
        Kernels {
            isa: $isa,
            haar_32fp: |c, s, m, r, d| unsafe { $module::haar_32fp(c, s, m, r, d) },
            haar_32fi: |c, s, m, r, d| unsafe { $module::haar_32fi(c, s, m, r, d) },
            lbp_32fp: |c, s, m, r, d| unsafe { $module::lbp_32fp(c, s, m, r, d) },
            lbp_32fi: |c, s, m, r, d| unsafe { $module::lbp_32fi(c, s, m, r, d) },
            lbp_16ip: |c, s, m, r, d| unsafe { $module::lbp_16ip(c, s, m, r, d) },
            lbp_16ii: |c, s, m, r, d| unsafe { $module::lbp_16ii(c, s, m, r, d) },
        }
    };
}

mod portable {
    use super::*;
    use crate::lanes::portable::{Portable, Portable16};

    entry_points!(Portable<8>, Portable16<16>);
}

#[cfg(target_arch = "x86_64")]
mod sse41 {
    use super::*;
    use crate::lanes::sse41::{Sse41F32, Sse41I16};

    entry_points!(#[target_feature(enable = "sse4.1")] Sse41F32, Sse41I16);
}

#[cfg(target_arch = "x86_64")]
mod avx2 {
    use super::*;
    use crate::lanes::avx2::{Avx2F32, Avx2I16};

    entry_points!(#[target_feature(enable = "avx2")] Avx2F32, Avx2I16);
}

#[cfg(target_arch = "x86_64")]
mod avx512bw {
    use super::*;
    use crate::lanes::avx512bw::{Avx512F32, Avx512I16};

    entry_points!(#[target_feature(enable = "avx512f,avx512bw")] Avx512F32, Avx512I16);
}

#[cfg(target_arch = "aarch64")]
mod neon {
    use super::*;
    use crate::lanes::neon::{NeonF32, NeonI16};

    entry_points!(#[target_feature(enable = "neon")] NeonF32, NeonI16);
}

impl Kernels {
    /// Kernels for `isa`, or `None` if this CPU cannot run them.
    pub fn for_isa(isa: Isa) -> Option<Kernels> {
        if !isa.is_supported() {
            return None;
        }
        let kernels = match isa {
            Isa::Base => Kernels {
                isa,
                haar_32fp: |c, s, m, r, d| driver::haar_rows_base(c, s, m, r, d, ScanMode::Progressive),
                haar_32fi: |c, s, m, r, d| driver::haar_rows_base(c, s, m, r, d, ScanMode::Interlaced),
                lbp_32fp: |c, s, m, r, d| driver::lbp32_rows_base(c, s, m, r, d, ScanMode::Progressive),
                lbp_32fi: |c, s, m, r, d| driver::lbp32_rows_base(c, s, m, r, d, ScanMode::Interlaced),
                lbp_16ip: |c, s, m, r, d| driver::lbp16_rows_base(c, s, m, r, d, ScanMode::Progressive),
                lbp_16ii: |c, s, m, r, d| driver::lbp16_rows_base(c, s, m, r, d, ScanMode::Interlaced),
            },
            Isa::Portable => kernel_table!(isa, portable),
            #[cfg(target_arch = "x86_64")]
            Isa::Sse41 => kernel_table!(isa, sse41),
            #[cfg(target_arch = "x86_64")]
            Isa::Avx2 => kernel_table!(isa, avx2),
            #[cfg(target_arch = "x86_64")]
            Isa::Avx512bw => kernel_table!(isa, avx512bw),
            #[cfg(target_arch = "aarch64")]
            Isa::Neon => kernel_table!(isa, neon),
            #[allow(unreachable_patterns)]
            _ => return None,
        };
        Some(kernels)
    }

    /// The widest supported kernels, detected once.
    pub fn best() -> &'static Kernels {
        static BEST: OnceLock<Kernels> = OnceLock::new();
        BEST.get_or_init(|| {
            let kernels = [Isa::Avx512bw, Isa::Avx2, Isa::Sse41, Isa::Neon]
                .into_iter()
                .find_map(Kernels::for_isa)
                .unwrap_or(kernel_table!(Isa::Portable, portable));
            tracing::info!(isa = ?kernels.isa, "Selected detection kernels");
            kernels
        })
    }

    /// Runs the kernel matching `cascade`'s type and scan mode.
    pub fn detect(
        &self,
        cascade: &Cascade,
        integral: &Integral,
        mask: &Buffer2<u8>,
        rect: Rect,
        band: &mut RowBand<'_>,
    ) {
        let interlaced = cascade.layout().mode == ScanMode::Interlaced;
        match cascade {
            Cascade::Haar(c) if interlaced => (self.haar_32fi)(c, integral, mask, rect, band),
            Cascade::Haar(c) => (self.haar_32fp)(c, integral, mask, rect, band),
            Cascade::Lbp32(c) if interlaced => (self.lbp_32fi)(c, integral, mask, rect, band),
            Cascade::Lbp32(c) => (self.lbp_32fp)(c, integral, mask, rect, band),
            Cascade::Lbp16(c) if interlaced => (self.lbp_16ii)(c, integral, mask, rect, band),
            Cascade::Lbp16(c) => (self.lbp_16ip)(c, integral, mask, rect, band),
        }
    }
}
