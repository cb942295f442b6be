/// Pipeline stage a worker is currently in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Stage {
    #[default]
    Loading,
    Centering,
    Masking,
    Saving,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loading => write!(f, "loading"),
            Self::Centering => write!(f, "crop/pad"),
            Self::Masking => write!(f, "masking"),
            Self::Saving => write!(f, "saving"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WorkerStatus {
    pub progress: f32,
    pub scan_number: u32,
    pub worker_id: usize,
    pub stage: Stage,
}

impl WorkerStatus {
    pub fn new(progress: f32, scan_number: u32, worker_id: usize, stage: Stage) -> Self {
        Self {
            progress,
            scan_number,
            worker_id,
            stage,
        }
    }
}
