use std::path::{Path, PathBuf};

use repro_core::NodeId;

/// Naming scheme for per-invocation log files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLayout {
    dir: PathBuf,
}

impl LogLayout {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Log of the experiment runner itself.
    pub fn runner(&self, node: &NodeId) -> PathBuf {
        self.dir.join(format!("{}.log", node.tag()))
    }

    /// Log of making the runner executable.
    pub fn chmod(&self, node: &NodeId) -> PathBuf {
        self.dir.join(format!("{}_chmod.log", node.tag()))
    }

    pub fn render(&self, node: &NodeId, script_stem: &str) -> PathBuf {
        self.dir
            .join(format!("{}_plot_{}.log", node.tag(), script_stem))
    }

    pub fn merge(&self, node: &NodeId, document_stem: &str, attempt: u32) -> PathBuf {
        self.dir.join(format!(
            "{}_pdfunite_{}_{}.log",
            node.tag(),
            document_stem,
            attempt
        ))
    }

    pub fn rasterize(&self, node: &NodeId, document_stem: &str, side: &str) -> PathBuf {
        self.dir.join(format!(
            "{}_pdftoppm_{}_{}.log",
            node.tag(),
            document_stem,
            side
        ))
    }

    pub fn compose(&self, node: &NodeId, document_stem: &str) -> PathBuf {
        self.dir
            .join(format!("{}_compose_{}.log", node.tag(), document_stem))
    }

    /// Document compiler log, optionally tagged with the triggering node.
    pub fn paper(&self, tag: Option<&str>) -> PathBuf {
        match tag {
            Some(tag) => self.dir.join(format!("paper__pdflatex__{tag}.log")),
            None => self.dir.join("paper__pdflatex.log"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_names_follow_node_tag() {
        let layout = LogLayout::new("/tmp/runs/_logs");
        let node = NodeId::new("real_world_experiments/citi_bike/query0");
        assert_eq!(
            layout.runner(&node),
            PathBuf::from("/tmp/runs/_logs/real_world_experiments__citi_bike__query0.log")
        );
        assert!(layout
            .render(&node, "latency_lineplot")
            .ends_with("real_world_experiments__citi_bike__query0_plot_latency_lineplot.log"));
        assert!(layout
            .paper(Some("effectiveness__ablation_study"))
            .ends_with("paper__pdflatex__effectiveness__ablation_study.log"));
    }
}
