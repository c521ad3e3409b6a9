//! Immutable pipeline configuration: ignore rules, priority tables, figure
//! routing, cohorts and repetition rules.
//!
//! [`PipelineConfig`] is the serialisable form (loaded from TOML over the
//! built-in defaults). [`CompiledConfig`] holds the same tables with every
//! regex and glob compiled once, and is passed explicitly to discovery, the
//! scheduler and the distributor.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobMatcher};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{config_error, io_error, ErrorInfo, ReproError};
use crate::types::{NodeId, NodeKind};

/// Name of the optional config file looked up in the experiment root.
pub const DEFAULT_CONFIG_FILE: &str = "repro.toml";

/// Complete, serialisable orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub discovery: DiscoveryConfig,
    pub artifacts: ArtifactConfig,
    pub output: OutputConfig,
    pub figures: FigureConfig,
    pub cohorts: Vec<CohortSpec>,
    pub repetitions: RepetitionConfig,
    pub tools: ToolConfig,
    pub paper: PaperConfig,
    pub compare: CompareConfig,
}

/// Rules deciding which directories are experiment nodes and in what order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Regexes matched against `"/" + relative_path`.
    pub ignore: Vec<String>,
    /// Families where only the top directory may be a node.
    pub exclusive_families: Vec<String>,
    /// Runner file names, highest priority first.
    pub runners: Vec<String>,
    /// Rank per top-level path segment; lower runs first.
    pub category_priority: BTreeMap<String, u32>,
    /// Rank for categories missing from the table.
    pub default_priority: u32,
    /// Lowercase path fragment marking present-only variants.
    pub present_marker: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            ignore: vec![
                r"(?:^|/)(?:\.git|__pycache__|.*_old.*|old$|empty$|REmatch-no-output(?:/|$))(?:/|$)"
                    .into(),
            ],
            exclusive_families: vec!["efficiency/flink_core_rematch".into()],
            runners: vec![
                "evaluation_script.sh".into(),
                "evaluation_script_suse.sh".into(),
                "run_efficiency_experiments.sh".into(),
            ],
            category_priority: BTreeMap::from([
                ("sensitivity_analysis".into(), 0),
                ("effectiveness".into(), 1),
                ("efficiency".into(), 2),
                ("real_world_experiments".into(), 3),
            ]),
            default_priority: 4,
            present_marker: "present_only".into(),
        }
    }
}

/// File naming conventions for tables, rendering scripts and documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Glob for result tables; also the idempotency signal.
    pub result_tables: String,
    /// Tables whose lowercase name contains this fragment are not distributed.
    pub stale_table_fragment: String,
    /// Runner logs copied next to the tables when present.
    pub runner_logs: Vec<String>,
    /// Rendering script globs, applied in order.
    pub render_scripts: Vec<String>,
    /// Sub-locations searched besides the node directory itself.
    pub render_dirs: Vec<String>,
    /// Glob for rendered documents.
    pub documents: String,
    /// Sub-location holding reference documents for comparison.
    pub reference_dir: String,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            result_tables: "report*.csv".into(),
            stale_table_fragment: "old".into(),
            runner_logs: vec!["output.log".into(), "nohup.out".into()],
            render_scripts: vec![
                "*plot*.py".into(),
                "*lineplot*.py".into(),
                "*boxplot*.py".into(),
                "statesummary_efficiency.py".into(),
                "statesummary_throughputgain.py".into(),
            ],
            render_dirs: vec!["plot".into(), "plots".into()],
            documents: "*.pdf".into(),
            reference_dir: "plot_paper_version".into(),
        }
    }
}

/// Layout of the output tree, relative to the output root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output root relative to the experiment root unless absolute.
    pub root: PathBuf,
    pub logs_dir: String,
    pub manifest_file: String,
    /// Sub-folder of each destination receiving rendered documents.
    pub documents_dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("runs"),
            logs_dir: "_logs".into(),
            manifest_file: "_manifest.json".into(),
            documents_dir: "plots".into(),
        }
    }
}

/// Static routing from node identity to canonical destination folders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FigureConfig {
    /// Node path to destination; the destination receives every document.
    pub by_node: BTreeMap<String, String>,
    /// Node path to per-document destinations.
    pub by_document: BTreeMap<String, BTreeMap<String, String>>,
}

impl Default for FigureConfig {
    fn default() -> Self {
        let by_node = [
            (
                "effectiveness/changing_summary_time_window_sizes",
                "Figure6a_changing_summary_time_window_sizes",
            ),
            (
                "effectiveness/changing_probability_distribution",
                "Figure6b_changing_probability_distribution",
            ),
            ("effectiveness/ablation_study", "Figure7a_ablation_study"),
            (
                "sensitivity_analysis/changing_number_of_eval_timestamps",
                "Figure8a_changing_number_of_eval_timestamps",
            ),
            ("sensitivity_analysis/changing_query_length", "Figure8b_changing_query_length"),
            (
                "sensitivity_analysis/changing_number_of_kleene_operators",
                "Figure8c_changing_number_of_kleene_operators",
            ),
            ("sensitivity_analysis/positional_kleene", "Figure8d_positional_kleene"),
            (
                "sensitivity_analysis/changing_number_of_disjunction_operators",
                "Figure8e_changing_number_of_disjunction_operators",
            ),
            ("sensitivity_analysis/overlapping_characters", "Figure8f_overlapping_characters"),
            ("efficiency/memory_experiment", "Figure10d_memory_experiment"),
        ]
        .into_iter()
        .map(|(node, dest)| (node.to_string(), dest.to_string()))
        .collect();

        let table = |entries: &[(&str, &str)]| -> BTreeMap<String, String> {
            entries
                .iter()
                .map(|(doc, dest)| (doc.to_string(), dest.to_string()))
                .collect()
        };
        let by_document = BTreeMap::from([
            (
                "effectiveness/recall/total_detected_matches".to_string(),
                table(&[
                    (
                        "total_matches_ratio_recall_stream_size_2000.pdf",
                        "Figure7b_total_matches_ratio_recall_stream_size_2000",
                    ),
                    (
                        "detected_matches_recall_stream_size_2000.pdf",
                        "Figure7c_detected_matches_recall_stream_size_2000",
                    ),
                ]),
            ),
            (
                "efficiency/flink_core_rematch".to_string(),
                table(&[
                    (
                        "suse_vs_rematch_vs_core_vs_flinkcep.pdf",
                        "Figure9a_suse_vs_rematch_vs_core_vs_flinkcep",
                    ),
                    (
                        "throughput_gain_over_rematch_core_flinkcep.pdf",
                        "Figure9b_throughput_gain_over_rematch_core_flinkcep",
                    ),
                ]),
            ),
            (
                "efficiency/runtime_summary_size_time_window_size".to_string(),
                table(&[
                    (
                        "execution_time_summary_time_window_comparison.pdf",
                        "Figure10a_execution_time_summary_time_window_comparison",
                    ),
                    ("throughput_boxplot.pdf", "Figure10b_throughput_boxplot"),
                    ("latency_boxplot.pdf", "Figure10c_latency_boxplot"),
                ]),
            ),
            (
                "real_world_experiments/citi_bike".to_string(),
                table(&[
                    ("CitiBike_queries.pdf", "Figure11a_CitiBike_queries"),
                    ("CitiBike_throughput_lineplot.pdf", "Figure11b_CitiBike_throughput_lineplot"),
                    ("CitiBike_latency_lineplot.pdf", "Figure11c_CitiBike_latency_lineplot"),
                ]),
            ),
            (
                "real_world_experiments/NASDAQ".to_string(),
                table(&[
                    ("NASDAQ_queries.pdf", "Figure12a_NASDAQ_queries"),
                    ("NASDAQ_throughput_lineplot.pdf", "Figure12b_NASDAQ_throughput_lineplot"),
                    ("NASDAQ_latency_lineplot.pdf", "Figure12c_NASDAQ_latency_lineplot"),
                ]),
            ),
        ]);
        Self {
            by_node,
            by_document,
        }
    }
}

/// A file expected in a node directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub node: String,
    pub file: String,
}

/// Copies `node/file` into the `into` directory once the cohort is ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyRule {
    pub node: String,
    pub file: String,
    pub into: String,
}

/// How the outputs of a cohort are combined before postprocessing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRule {
    /// Directory that is postprocessed once the merge has happened.
    pub target: String,
    /// Tables that must all exist before the merge proceeds.
    pub requires: Vec<FileRef>,
    pub copies: Vec<CopyRule>,
    /// Explicit table list distributed for the target instead of the
    /// result-table glob.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tables: Option<Vec<String>>,
}

/// A fixed set of nodes launched together behind a completion barrier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortSpec {
    pub id: String,
    pub members: Vec<String>,
    pub merge: MergeRule,
}

fn default_cohorts() -> Vec<CohortSpec> {
    let file = |node: &str, file: &str| FileRef {
        node: node.into(),
        file: file.into(),
    };
    let copy = |node: &str, file: &str, into: &str| CopyRule {
        node: node.into(),
        file: file.into(),
        into: into.into(),
    };
    let citi = "real_world_experiments/citi_bike";
    let q0 = "real_world_experiments/citi_bike/query0";
    let q1 = "real_world_experiments/citi_bike/query1";
    let ablation = "effectiveness/ablation_study";
    let ablation_present = "effectiveness/ablation_study/present_only";
    let recall = "effectiveness/recall/total_detected_matches";
    let recall_present = "effectiveness/recall/total_detected_matches_present_only";
    vec![
        CohortSpec {
            id: "citi_bike".into(),
            members: vec![q0.into(), q1.into()],
            merge: MergeRule {
                target: citi.into(),
                requires: vec![file(q0, "report_query_0.csv"), file(q1, "report_query_1.csv")],
                copies: vec![
                    copy(q0, "report_query_0.csv", citi),
                    copy(q1, "report_query_1.csv", citi),
                ],
                tables: Some(vec!["report_query_0.csv".into(), "report_query_1.csv".into()]),
            },
        },
        CohortSpec {
            id: "ablation_study".into(),
            members: vec![ablation.into(), ablation_present.into()],
            merge: MergeRule {
                target: ablation.into(),
                requires: vec![
                    file(ablation, "report.csv"),
                    file(ablation_present, "report_present.csv"),
                ],
                copies: vec![copy(ablation_present, "report_present.csv", ablation)],
                tables: None,
            },
        },
        CohortSpec {
            id: "recall".into(),
            members: vec![recall.into(), recall_present.into()],
            merge: MergeRule {
                target: recall.into(),
                requires: vec![
                    file(recall, "report_suse.csv"),
                    file(recall_present, "report_suse_wo_expected.csv"),
                ],
                copies: vec![copy(recall_present, "report_suse_wo_expected.csv", recall)],
                tables: None,
            },
        },
    ]
}

/// Repetition count rule; the first rule whose regex matches the node wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepetitionRule {
    pub pattern: String,
    pub standard: u32,
    pub extensive: u32,
}

/// How the repetition count reaches a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RepetitionMode {
    /// Rewrite the assignment line in the runner scripts and export the value.
    #[default]
    Patch,
    /// Only export the value through the environment.
    Env,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepetitionConfig {
    /// Shell variable holding the repetition count.
    pub variable: String,
    /// Scripts rewritten in patch mode.
    pub scripts: Vec<String>,
    pub mode: RepetitionMode,
    pub rules: Vec<RepetitionRule>,
}

impl Default for RepetitionConfig {
    fn default() -> Self {
        let rule = |pattern: &str, standard: u32, extensive: u32| RepetitionRule {
            pattern: pattern.into(),
            standard,
            extensive,
        };
        Self {
            variable: "NUM_OF_RUNS".into(),
            scripts: vec![
                "evaluation_script.sh".into(),
                "evaluation_script_suse.sh".into(),
            ],
            mode: RepetitionMode::Patch,
            rules: vec![
                rule(
                    r"^sensitivity_analysis/[^/]*(?:overlapping_characters|changing_number_of_eval_timestamps)[^/]*$",
                    50,
                    50,
                ),
                rule(
                    r"^sensitivity_analysis/[^/]*changing_number_of_disjunction_operators[^/]*$",
                    5,
                    25,
                ),
                rule(r"^sensitivity_analysis/[^/]+$", 10, 50),
                rule(r"^effectiveness/changing_probability_distribution$", 25, 25),
                rule(r"^effectiveness/changing_summary_time_window_sizes$", 10, 50),
                rule(r"^effectiveness/ablation_study$", 5, 25),
                rule(r"^effectiveness/ablation_study/present_only$", 5, 25),
            ],
        }
    }
}

/// External programs invoked by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub shell: String,
    pub python: String,
    pub latex: String,
    pub pdf_merge: String,
    pub rasterizer: String,
    pub svg_to_pdf: String,
    /// Variables forcing rendering into a non-interactive mode.
    pub non_interactive_env: BTreeMap<String, String>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            shell: "/bin/bash".into(),
            python: "python3".into(),
            latex: "pdflatex".into(),
            pdf_merge: "pdfunite".into(),
            rasterizer: "pdftoppm".into(),
            svg_to_pdf: "rsvg-convert".into(),
            non_interactive_env: BTreeMap::from([("MPLBACKEND".into(), "Agg".into())]),
        }
    }
}

/// Document compiler boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperConfig {
    /// Source directory, relative to the experiment root.
    pub dir: String,
    pub source: String,
    /// Suffix appended to the source stem for the reference build.
    pub reference_suffix: String,
    pub original_output: String,
    pub reproduced_output: String,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            dir: "paper".into(),
            source: "summarySelector_sigmod25_cameraReady.tex".into(),
            reference_suffix: "-paper".into(),
            original_output: "paper_plots.pdf".into(),
            reproduced_output: "paper_plots_reproduced.pdf".into(),
        }
    }
}

impl PaperConfig {
    fn stem(&self) -> &str {
        self.source.strip_suffix(".tex").unwrap_or(&self.source)
    }

    /// File name of the freshly compiled document.
    pub fn produced_name(&self) -> String {
        format!("{}.pdf", self.stem())
    }

    /// File name of the pre-existing reference document.
    pub fn reference_name(&self) -> String {
        format!("{}{}.pdf", self.stem(), self.reference_suffix)
    }
}

/// Comparison rendering parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareConfig {
    pub merge_attempts: u32,
    pub retry_delay_ms: u64,
    pub dpi: u32,
    pub left_caption: String,
    pub right_caption: String,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            merge_attempts: 3,
            retry_delay_ms: 500,
            dpi: 600,
            left_caption: "paper plot".into(),
            right_caption: "reproduced plot".into(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            discovery: DiscoveryConfig::default(),
            artifacts: ArtifactConfig::default(),
            output: OutputConfig::default(),
            figures: FigureConfig::default(),
            cohorts: default_cohorts(),
            repetitions: RepetitionConfig::default(),
            tools: ToolConfig::default(),
            paper: PaperConfig::default(),
            compare: CompareConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Built-in reproducibility tables.
    pub fn reproducibility() -> Self {
        Self::default()
    }

    /// Parses TOML; omitted sections fall back to the built-in tables.
    pub fn from_toml_str(raw: &str) -> Result<Self, ReproError> {
        toml::from_str(raw).map_err(|err| config_error("repro.config_parse", err.to_string()))
    }

    /// Reads a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ReproError> {
        let raw =
            fs::read_to_string(path).map_err(|err| io_error("repro.config_read", path, err))?;
        Self::from_toml_str(&raw)
    }

    /// Resolves the effective config: an explicit file, else `repro.toml` in
    /// the root, else the built-in tables.
    pub fn resolve(root: &Path, explicit: Option<&Path>) -> Result<Self, ReproError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let candidate = root.join(DEFAULT_CONFIG_FILE);
        if candidate.is_file() {
            return Self::load(&candidate);
        }
        Ok(Self::reproducibility())
    }

    pub fn to_toml_string(&self) -> Result<String, ReproError> {
        toml::to_string_pretty(self)
            .map_err(|err| config_error("repro.config_serialize", err.to_string()))
    }

    /// Compiles every pattern and checks the cohort table.
    pub fn compile(&self) -> Result<CompiledConfig, ReproError> {
        CompiledConfig::new(self.clone())
    }

    /// Checks runner names, the cohort table and that every pattern compiles.
    pub fn validate(&self) -> Result<(), ReproError> {
        self.compile().map(|_| ())
    }
}

/// One destination implied by the figure mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    /// Path below the output root: `<category>/<name>`.
    pub rel: PathBuf,
    /// `None` copies every document; otherwise only the listed file names.
    pub allow: Option<BTreeSet<String>>,
}

impl Destination {
    pub fn accepts(&self, file_name: &str) -> bool {
        self.allow
            .as_ref()
            .map_or(true, |allow| allow.contains(file_name))
    }
}

#[derive(Debug, Clone)]
struct CompiledRepetition {
    pattern: Regex,
    standard: u32,
    extensive: u32,
}

/// [`PipelineConfig`] with every pattern compiled. Built once at startup.
#[derive(Debug, Clone)]
pub struct CompiledConfig {
    raw: PipelineConfig,
    ignore: Vec<Regex>,
    result_tables: GlobMatcher,
    documents: GlobMatcher,
    render_scripts: Vec<GlobMatcher>,
    repetitions: Vec<CompiledRepetition>,
}

fn pattern_error(code: &str, pattern: &str, err: impl ToString) -> ReproError {
    ReproError::Config(ErrorInfo::new(code, err.to_string()).with_context("pattern", pattern))
}

fn glob(pattern: &str) -> Result<Glob, ReproError> {
    Glob::new(pattern).map_err(|err| pattern_error("repro.config_glob", pattern, err))
}

fn regex(pattern: &str) -> Result<Regex, ReproError> {
    Regex::new(pattern).map_err(|err| pattern_error("repro.config_regex", pattern, err))
}

impl CompiledConfig {
    fn new(raw: PipelineConfig) -> Result<Self, ReproError> {
        check_tables(&raw)?;
        let ignore = raw
            .discovery
            .ignore
            .iter()
            .map(|pattern| regex(pattern))
            .collect::<Result<Vec<_>, _>>()?;
        let render_scripts = raw
            .artifacts
            .render_scripts
            .iter()
            .map(|pattern| glob(pattern).map(|glob| glob.compile_matcher()))
            .collect::<Result<Vec<_>, _>>()?;
        let repetitions = raw
            .repetitions
            .rules
            .iter()
            .map(|rule| {
                Ok(CompiledRepetition {
                    pattern: regex(&rule.pattern)?,
                    standard: rule.standard,
                    extensive: rule.extensive,
                })
            })
            .collect::<Result<Vec<_>, ReproError>>()?;
        Ok(Self {
            result_tables: glob(&raw.artifacts.result_tables)?.compile_matcher(),
            documents: glob(&raw.artifacts.documents)?.compile_matcher(),
            ignore,
            render_scripts,
            repetitions,
            raw,
        })
    }

    pub fn discovery(&self) -> &DiscoveryConfig {
        &self.raw.discovery
    }

    pub fn artifacts(&self) -> &ArtifactConfig {
        &self.raw.artifacts
    }

    pub fn output(&self) -> &OutputConfig {
        &self.raw.output
    }

    pub fn tools(&self) -> &ToolConfig {
        &self.raw.tools
    }

    pub fn paper(&self) -> &PaperConfig {
        &self.raw.paper
    }

    pub fn compare(&self) -> &CompareConfig {
        &self.raw.compare
    }

    pub fn repetitions(&self) -> &RepetitionConfig {
        &self.raw.repetitions
    }

    pub fn cohorts(&self) -> &[CohortSpec] {
        &self.raw.cohorts
    }

    /// True when any ignore rule matches `"/" + rel`.
    pub fn is_ignored(&self, rel: &str) -> bool {
        let probe = format!("/{rel}");
        self.ignore.iter().any(|rule| rule.is_match(&probe))
    }

    /// True when `rel` lies strictly below an exclusive family root.
    pub fn is_family_descendant(&self, rel: &NodeId) -> bool {
        self.raw
            .discovery
            .exclusive_families
            .iter()
            .map(NodeId::new)
            .any(|family| rel.starts_with(&family) && *rel != family)
    }

    /// Rank of a top-level category.
    pub fn priority(&self, category: &str) -> u32 {
        self.raw
            .discovery
            .category_priority
            .get(category)
            .copied()
            .unwrap_or(self.raw.discovery.default_priority)
    }

    /// Stable composite ordering key for a node.
    pub fn sort_key(&self, id: &NodeId) -> (u32, u8, String) {
        let lower = id.as_str().to_lowercase();
        let present = if lower.contains(&self.raw.discovery.present_marker.to_lowercase()) {
            0
        } else {
            1
        };
        (self.priority(id.category()), present, lower)
    }

    /// Cohort listing `id` as a member.
    pub fn cohort_of(&self, id: &NodeId) -> Option<&CohortSpec> {
        self.raw
            .cohorts
            .iter()
            .find(|cohort| cohort.members.iter().any(|member| NodeId::new(member) == *id))
    }

    pub fn cohort(&self, cohort_id: &str) -> Option<&CohortSpec> {
        self.raw.cohorts.iter().find(|cohort| cohort.id == cohort_id)
    }

    /// Scheduling role of a node.
    pub fn kind_of(&self, id: &NodeId) -> NodeKind {
        if let Some(cohort) = self.cohort_of(id) {
            return NodeKind::CohortMember(cohort.id.clone());
        }
        match self
            .raw
            .cohorts
            .iter()
            .find(|cohort| NodeId::new(&cohort.merge.target) == *id)
        {
            Some(cohort) => NodeKind::DeferredUntilCohortReady(cohort.id.clone()),
            None => NodeKind::Standard,
        }
    }

    /// Destinations for a node. Never empty: unmapped nodes fall back to
    /// their flattened path.
    pub fn destinations(&self, id: &NodeId) -> Vec<Destination> {
        let category = PathBuf::from(id.category());
        if let Some(per_doc) = self.raw.figures.by_document.get(id.as_str()) {
            if !per_doc.is_empty() {
                return per_doc
                    .iter()
                    .map(|(doc, dest)| Destination {
                        rel: category.join(dest),
                        allow: Some(BTreeSet::from([doc.clone()])),
                    })
                    .collect();
            }
        }
        let name = self
            .raw
            .figures
            .by_node
            .get(id.as_str())
            .cloned()
            .unwrap_or_else(|| id.tag());
        vec![Destination {
            rel: category.join(name),
            allow: None,
        }]
    }

    /// Repetition count for a node, if any rule applies.
    pub fn repetition_count(&self, id: &NodeId, extensive: bool) -> Option<u32> {
        self.repetitions
            .iter()
            .find(|rule| rule.pattern.is_match(id.as_str()))
            .map(|rule| if extensive { rule.extensive } else { rule.standard })
    }

    /// Whether a file name is a distributable result table.
    pub fn is_result_table(&self, file_name: &str) -> bool {
        self.result_tables.is_match(file_name)
    }

    /// Whether a result table should be left out of distribution.
    pub fn is_stale_table(&self, file_name: &str) -> bool {
        let fragment = &self.raw.artifacts.stale_table_fragment;
        !fragment.is_empty() && file_name.to_lowercase().contains(&fragment.to_lowercase())
    }

    pub fn is_document(&self, file_name: &str) -> bool {
        self.documents.is_match(file_name)
    }

    /// Rendering script matchers in declaration order.
    pub fn render_matchers(&self) -> &[GlobMatcher] {
        &self.render_scripts
    }
}

fn check_tables(raw: &PipelineConfig) -> Result<(), ReproError> {
    if raw.discovery.runners.is_empty() {
        return Err(config_error(
            "repro.config_runners",
            "at least one runner file name must be configured",
        ));
    }
    let mut seen = BTreeSet::new();
    let mut ids = BTreeSet::new();
    for cohort in &raw.cohorts {
        if !ids.insert(cohort.id.as_str()) {
            return Err(config_error(
                "repro.config_cohort_id",
                format!("cohort {} declared twice", cohort.id),
            ));
        }
        if cohort.members.is_empty() {
            return Err(config_error(
                "repro.config_cohort_members",
                format!("cohort {} has no members", cohort.id),
            ));
        }
        if NodeId::new(&cohort.merge.target).as_str().is_empty() {
            return Err(config_error(
                "repro.config_cohort_target",
                format!("cohort {} has an empty merge target", cohort.id),
            ));
        }
        for member in &cohort.members {
            if !seen.insert(NodeId::new(member)) {
                return Err(config_error(
                    "repro.config_cohort_overlap",
                    format!("node {member} belongs to more than one cohort"),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiled() -> CompiledConfig {
        PipelineConfig::reproducibility().compile().expect("defaults compile")
    }

    #[test]
    fn default_ignore_rules_match_original_layout() {
        let config = compiled();
        assert!(config.is_ignored(".git/objects"));
        assert!(config.is_ignored("effectiveness/__pycache__"));
        assert!(config.is_ignored("efficiency/memory_experiment_old"));
        assert!(config.is_ignored("sensitivity_analysis/old"));
        assert!(config.is_ignored("efficiency/REmatch-no-output/bin"));
        assert!(!config.is_ignored("effectiveness/ablation_study"));
        assert!(!config.is_ignored("effectiveness/holder"));
    }

    #[test]
    fn kinds_follow_cohort_table() {
        let config = compiled();
        assert_eq!(
            config.kind_of(&NodeId::new("real_world_experiments/citi_bike/query0")),
            NodeKind::CohortMember("citi_bike".into())
        );
        assert_eq!(
            config.kind_of(&NodeId::new("real_world_experiments/citi_bike")),
            NodeKind::DeferredUntilCohortReady("citi_bike".into())
        );
        assert_eq!(
            config.kind_of(&NodeId::new("efficiency/memory_experiment")),
            NodeKind::Standard
        );
    }

    #[test]
    fn repetition_rules_pick_first_match() {
        let config = compiled();
        let disj = NodeId::new("sensitivity_analysis/changing_number_of_disjunction_operators");
        assert_eq!(config.repetition_count(&disj, false), Some(5));
        assert_eq!(config.repetition_count(&disj, true), Some(25));
        let overlap = NodeId::new("sensitivity_analysis/overlapping_characters");
        assert_eq!(config.repetition_count(&overlap, false), Some(50));
        let other = NodeId::new("sensitivity_analysis/positional_kleene");
        assert_eq!(config.repetition_count(&other, true), Some(50));
        assert_eq!(
            config.repetition_count(&NodeId::new("efficiency/memory_experiment"), true),
            None
        );
    }

    #[test]
    fn overlapping_cohorts_are_rejected() {
        let mut raw = PipelineConfig::reproducibility();
        let mut dup = raw.cohorts[0].clone();
        dup.id = "dup".into();
        raw.cohorts.push(dup);
        let err = raw.validate().expect_err("overlap must fail");
        assert_eq!(err.info().code, "repro.config_cohort_overlap");
    }

    #[test]
    fn partial_toml_keeps_default_tables() {
        let raw = "[tools]\npython = \"python3.11\"\n";
        let config = PipelineConfig::from_toml_str(raw).expect("parse");
        assert_eq!(config.tools.python, "python3.11");
        assert_eq!(config.tools.shell, "/bin/bash");
        assert_eq!(config.cohorts.len(), 3);
        assert_eq!(config.discovery.runners.len(), 3);
    }
}
