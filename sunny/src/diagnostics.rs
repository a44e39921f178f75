use crate::sunny_common::*;

use candle_util::candle_core::utils;

/// What the process can run on
#[derive(Clone, Debug)]
pub struct Diagnostics {
    pub version: &'static str,
    pub num_cpus: usize,
    pub candle_threads: usize,
    pub cuda: bool,
    pub metal: bool,
    pub mkl: bool,
    pub accelerate: bool,
    pub avx: bool,
    pub neon: bool,
    pub f16c: bool,
}

impl Diagnostics {
    pub fn collect() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            num_cpus: num_cpus::get(),
            candle_threads: utils::get_num_threads(),
            cuda: utils::cuda_is_available(),
            metal: utils::metal_is_available(),
            mkl: utils::has_mkl(),
            accelerate: utils::has_accelerate(),
            avx: utils::with_avx(),
            neon: utils::with_neon(),
            f16c: utils::with_f16c(),
        }
    }

    /// Missing accelerators are reported, not treated as errors
    pub fn log(&self) {
        for line in self.to_string().lines() {
            info!("{}", line);
        }
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "sunny version: {}", self.version)?;
        writeln!(f, "CPUs: {}", self.num_cpus)?;
        writeln!(f, "candle threads: {}", self.candle_threads)?;
        writeln!(f, "CUDA available: {}", self.cuda)?;
        writeln!(f, "Metal available: {}", self.metal)?;
        writeln!(f, "MKL: {}, Accelerate: {}", self.mkl, self.accelerate)?;
        write!(
            f,
            "AVX: {}, NEON: {}, F16C: {}",
            self.avx, self.neon, self.f16c
        )
    }
}
