//! Summary of one converge run, written out with `--report`.

use serde::{Deserialize, Serialize};

use super::Strategy;


#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub target_host: String,
    pub strategy: Strategy,
    /// Full scans performed, including the final one that changed nothing.
    pub passes: u32,
    /// Objects prepared, in the order they were prepared.
    pub prepared: Vec<String>,
    /// Objects run to `done`, in the order they ran.
    pub ran: Vec<String>,
    /// Objects whose generated code was non-empty.
    pub changed: Vec<String>,
    pub dry_run: bool,
    pub elapsed_ms: u64,
}

impl RunReport {
    pub fn new(target_host: &str, strategy: Strategy, dry_run: bool) -> Self {
        RunReport {
            target_host: target_host.to_string(),
            strategy,
            dry_run,
            ..RunReport::default()
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_serializes_to_json() {
        let mut report = RunReport::new("web1", Strategy::FixedPoint, false);
        report.passes = 2;
        report.ran.push("__pkg/foo".into());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["target_host"], "web1");
        assert_eq!(json["strategy"], "fixed_point");
        assert_eq!(json["passes"], 2);
        assert_eq!(json["ran"][0], "__pkg/foo");
    }
}
