use clap::ValueEnum;

/// Migration chosen on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Migration {
    Neighborhoods,
    HappyHours,
    All,
}

impl Migration {
    pub fn steps(self) -> &'static [Step] {
        match self {
            Migration::Neighborhoods => &[Step::Neighborhoods],
            Migration::HappyHours => &[Step::HappyHours],
            Migration::All => &[Step::Neighborhoods, Step::HappyHours],
        }
    }
}

/// A single migration run against the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Neighborhoods,
    HappyHours,
}

impl Step {
    pub fn label(self) -> &'static str {
        match self {
            Step::Neighborhoods => "neighborhoods",
            Step::HappyHours => "happy hours",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Migrated,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MigrationReport {
    pub total: usize,
    pub migrated: usize,
    pub skipped: usize,
}

impl MigrationReport {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn record(self, outcome: Outcome) -> Self {
        match outcome {
            Outcome::Migrated => Self {
                migrated: self.migrated + 1,
                ..self
            },
            Outcome::Skipped => Self {
                skipped: self.skipped + 1,
                ..self
            },
        }
    }
}

/// Restaurant still carrying only the free-text neighborhood.
pub struct LegacyNeighborhood {
    pub id: i64,
    pub text: String,
}

/// Restaurant whose happy hour has not been structured yet.
pub struct LegacyHappyHour {
    pub id: i64,
    pub text: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}
