use crate::models::ManagedProcess;
use std::sync::{Arc, Mutex, MutexGuard};

/// 所有引擎当前存活进程的共享注册表
///
/// supervisor 在 spawn 时添加，supervisor（正常结束）和 monitor
/// （query 出错强制 kill）都可以移除。monitor 只遍历快照。
#[derive(Debug, Default)]
pub struct Registry {
    processes: Mutex<Vec<Arc<ManagedProcess>>>,
}

pub type SharedRegistry = Arc<Registry>;

pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::default())
}

impl Registry {
    fn lock(&self) -> MutexGuard<'_, Vec<Arc<ManagedProcess>>> {
        // 临界区内没有会 panic 的操作，中毒后照常使用
        self.processes.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(&self, process: Arc<ManagedProcess>) {
        log::debug!(
            "Registered {} (pid {}) for engine {}",
            process.script,
            process.pid,
            process.engine_name
        );
        self.lock().push(process);
    }

    /// 移除进程；已经不在注册表中时返回 false
    pub fn remove(&self, id: u64) -> bool {
        let mut processes = self.lock();
        match processes.iter().position(|p| p.id() == id) {
            Some(index) => {
                processes.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: u64) -> bool {
        self.lock().iter().any(|p| p.id() == id)
    }

    pub fn snapshot(&self) -> Vec<Arc<ManagedProcess>> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_remove() {
        let registry = new_registry();
        let a = Arc::new(ManagedProcess::new("a.js", "node", 100));
        let b = Arc::new(ManagedProcess::new("b.js", "bun", 200));

        registry.register(a.clone());
        registry.register(b.clone());
        assert_eq!(registry.len(), 2);
        assert!(registry.contains(a.id()));

        assert!(registry.remove(a.id()));
        assert!(!registry.remove(a.id()));
        assert_eq!(registry.len(), 1);
        assert!(!registry.contains(a.id()));
    }

    #[test]
    fn test_removal_during_snapshot_iteration() {
        let registry = new_registry();
        for i in 0..4 {
            registry.register(Arc::new(ManagedProcess::new(format!("{}.js", i), "node", i)));
        }

        let snapshot = registry.snapshot();
        for process in &snapshot {
            registry.remove(process.id());
        }

        assert_eq!(snapshot.len(), 4);
        assert!(registry.is_empty());
    }
}
