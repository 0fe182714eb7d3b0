#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunKind {
    #[default]
    Calibration,
    Reconstruction,
}

/// Progress report sent by the engine after each scheduled path
#[derive(Debug, Clone, Default)]
pub struct StageStatus {
    pub kind: RunKind,
    pub path_name: String,
    pub index: usize,
    pub total: usize,
}

impl StageStatus {
    pub fn new(kind: RunKind, path_name: &str, index: usize, total: usize) -> Self {
        Self {
            kind,
            path_name: path_name.to_string(),
            index,
            total,
        }
    }

    /// Fraction of the scheduled paths finished, in [0, 1]
    pub fn progress(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.index as f32 / self.total as f32
        }
    }
}
