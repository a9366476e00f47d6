/// Per-container aggregate over every `ProcEntry` sharing a context id.
/// Auto-created when the first matching process appears; auto-removed when
/// a context refresh finds no remaining members.
#[derive(Clone, Debug)]
pub struct ContextEntry {
    pub ctx_id: u64,
    pub ctx_name: String,
    pub total_cpu_time: u64,
    pub total_cpu_percent: u32,
    pub total_mem_vmrss: u64,
}

impl ContextEntry {
    pub fn new(ctx_id: u64, ctx_name: String) -> Self {
        Self {
            ctx_id,
            ctx_name,
            total_cpu_time: 0,
            total_cpu_percent: 0,
            total_mem_vmrss: 0,
        }
    }

    pub fn reset(&mut self) {
        self.total_cpu_time = 0;
        self.total_cpu_percent = 0;
        self.total_mem_vmrss = 0;
    }
}
