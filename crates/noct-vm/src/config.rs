//! VM tuning knobs (spec §6 "two process-wide configuration flags" plus
//! §ADDED-JIT's stub flags), gathered into one struct the CLI populates from
//! flags the way `lumen-cli::config` does.

#[derive(Debug, Clone)]
pub struct VmConfig {
    pub call_depth_limit: u32,
    pub gc_soft_threshold: u64,
    pub collect_on_shutdown: bool,
    pub jit_enabled: bool,
    pub jit_threshold: u32,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            call_depth_limit: 64,
            gc_soft_threshold: 4096,
            collect_on_shutdown: false,
            jit_enabled: false,
            jit_threshold: 1000,
        }
    }
}
