//! Host metrics for node snapshots

use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SystemSample {
    /// Mean CPU usage across cores, percent
    pub cpu_usage: f32,
    /// Used memory, percent of total
    pub memory_usage: f32,
}

/// Reuses one `sysinfo::System` so CPU usage is measured between refreshes
pub struct SystemSampler {
    sys: Mutex<sysinfo::System>,
}

impl SystemSampler {
    pub fn new() -> Self {
        let mut sys = sysinfo::System::new();
        sys.refresh_cpu();
        sys.refresh_memory();
        Self {
            sys: Mutex::new(sys),
        }
    }

    pub fn sample(&self) -> SystemSample {
        let mut sys = self.sys.lock().unwrap_or_else(|p| p.into_inner());
        sys.refresh_cpu();
        sys.refresh_memory();

        let cpu_count = sys.cpus().len().max(1);
        let cpu_usage = sys.cpus().iter().map(|c| c.cpu_usage()).sum::<f32>() / cpu_count as f32;
        let total_memory = sys.total_memory().max(1);
        let memory_usage = (sys.used_memory() as f32 / total_memory as f32) * 100.0;

        SystemSample {
            cpu_usage,
            memory_usage,
        }
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_is_a_percentage() {
        let sampler = SystemSampler::new();
        let sample = sampler.sample();
        assert!(sample.cpu_usage >= 0.0);
        assert!((0.0..=100.0).contains(&sample.memory_usage));
    }
}
