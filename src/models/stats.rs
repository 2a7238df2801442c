use serde::Serialize;

/// 单次采样：整个进程树的 CPU 与内存
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    /// CPU 使用率 (百分比，多核下可超过 100)
    pub cpu: f32,
    /// 常驻内存 (字节)
    pub mem: u64,
}

/// 单个 resource query 返回的一条记录（进程树中的某个进程）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceReading {
    pub pid: u32,
    pub cpu: f32,
    pub mem: u64,
}

impl Sample {
    /// 把进程树的读数合并为一个 (cpu, mem) 对
    pub fn aggregate(readings: &[ResourceReading]) -> Self {
        readings.iter().fold(Sample { cpu: 0.0, mem: 0 }, |acc, r| Sample {
            cpu: acc.cpu + r.cpu,
            mem: acc.mem.saturating_add(r.mem),
        })
    }
}

/// 测试结束时的资源统计
///
/// 没有任何采样时（进程比一个 tick 还短），min/max 为 `None`，
/// 序列化为 `null`。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SampleStats {
    pub cpu: Vec<f32>,
    pub mem: Vec<u64>,
    pub max_cpu: Option<f32>,
    pub min_cpu: Option<f32>,
    pub max_mem: Option<u64>,
    pub min_mem: Option<u64>,
}

impl SampleStats {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_samples(samples: &[Sample]) -> Self {
        let cpu: Vec<f32> = samples.iter().map(|s| s.cpu).collect();
        let mem: Vec<u64> = samples.iter().map(|s| s.mem).collect();

        // f32::max/min 忽略 NaN
        let max_cpu = cpu.iter().copied().reduce(f32::max);
        let min_cpu = cpu.iter().copied().reduce(f32::min);

        Self {
            max_mem: mem.iter().copied().max(),
            min_mem: mem.iter().copied().min(),
            cpu,
            mem,
            max_cpu,
            min_cpu,
        }
    }

    pub fn len(&self) -> usize {
        self.cpu.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cpu.is_empty()
    }
}
