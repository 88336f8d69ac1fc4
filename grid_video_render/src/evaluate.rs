// Render graph evaluation.
//
// Walks the nodes reachable from a root in topological order and hands each
// one to the `RenderTool` as a `RenderJob`. Every node's artifact path is
// memoized, so a node shared by many parents is rendered once. `Source`
// nodes are their own artifact and cost no invocation.
//
// Intermediates are written to the work directory as
// `<id>-<kind>.<extension>` (audio-only nodes use `.wav`). The root writes
// straight to the caller's output path. Evaluation is sequential and stops
// at the first failed job; artifacts already produced stay on disk.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::error::RenderError;
use crate::graph::{NodeId, RenderGraph, RenderNode};
use crate::tool::{JobOp, RenderJob, RenderTool};

pub struct Evaluator<'a, T: RenderTool + ?Sized> {
    graph: &'a RenderGraph,
    tool: &'a mut T,
    work_dir: PathBuf,
    extension: String,
    artifacts: Vec<Option<PathBuf>>,
    invocations: usize,
}

impl<'a, T: RenderTool + ?Sized> Evaluator<'a, T> {
    pub fn new(graph: &'a RenderGraph, tool: &'a mut T, work_dir: &Path, extension: &str) -> Self {
        Evaluator {
            graph,
            tool,
            work_dir: work_dir.to_path_buf(),
            extension: extension.trim_start_matches('.').to_string(),
            artifacts: vec![None; graph.len()],
            invocations: 0,
        }
    }

    /// Render `root` and everything it depends on, leaving the result at
    /// `output`.
    #[instrument(skip(self, output), fields(output = %output.display()))]
    pub fn evaluate(&mut self, root: NodeId, output: &Path) -> Result<PathBuf, RenderError> {
        let order = self.graph.topological_order(root)?;
        debug!(nodes = order.len(), "evaluation order resolved");

        for id in order {
            if self.artifacts[id].is_some() {
                continue;
            }
            let node = self.graph.node(id)?;
            let artifact = match job_op(node) {
                None => match node {
                    RenderNode::Source(path) => path.clone(),
                    _ => return Err(RenderError::UnknownNode(id)),
                },
                Some(op) => {
                    let inputs = node
                        .dependencies()
                        .into_iter()
                        .map(|dep| self.artifacts[dep].clone().ok_or(RenderError::UnknownNode(dep)))
                        .collect::<Result<Vec<_>, _>>()?;
                    let output = if id == root {
                        output.to_path_buf()
                    } else {
                        self.intermediate_path(id, node)
                    };
                    let job = RenderJob { op, inputs, output };
                    debug!(node = id, kind = node.kind(), "rendering");
                    self.invocations += 1;
                    self.tool.run(&job)?
                }
            };
            self.artifacts[id] = Some(artifact);
        }

        let artifact = self.artifacts[root]
            .clone()
            .ok_or(RenderError::UnknownNode(root))?;
        if artifact.as_path() != output {
            std::fs::copy(&artifact, output)?;
        }
        info!(invocations = self.invocations, "render finished");
        Ok(output.to_path_buf())
    }

    /// Number of jobs handed to the tool so far.
    pub fn invocations(&self) -> usize {
        self.invocations
    }

    fn intermediate_path(&self, id: NodeId, node: &RenderNode) -> PathBuf {
        let extension = match node {
            RenderNode::ExtractAudio(_) | RenderNode::Mix(_) => "wav",
            _ => self.extension.as_str(),
        };
        self.work_dir
            .join(format!("{id:05}-{}.{extension}", node.kind()))
    }
}

/// The job operation for a node; `None` for sources.
pub fn job_op(node: &RenderNode) -> Option<JobOp> {
    let op = match node {
        RenderNode::Source(_) => return None,
        RenderNode::Trim { start, end, .. } => JobOp::Trim {
            start: *start,
            end: *end,
        },
        RenderNode::Concat(_) => JobOp::Concat,
        RenderNode::Scale { width, height, .. } => JobOp::Scale {
            width: *width,
            height: *height,
        },
        RenderNode::Overlay {
            positions,
            canvas,
            color,
            ..
        } => JobOp::Overlay {
            canvas: *canvas,
            color: color.clone(),
            positions: positions.clone(),
        },
        RenderNode::ExtractAudio(_) => JobOp::ExtractAudio,
        RenderNode::Mix(_) => JobOp::Mix,
        RenderNode::Mux { .. } => JobOp::Mux,
    };
    Some(op)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records jobs and creates empty output files. Fails on the job whose
    /// index is `fail_at`.
    #[derive(Default)]
    struct Recorder {
        jobs: Vec<RenderJob>,
        fail_at: Option<usize>,
    }

    impl RenderTool for Recorder {
        fn run(&mut self, job: &RenderJob) -> Result<PathBuf, RenderError> {
            if self.fail_at == Some(self.jobs.len()) {
                return Err(RenderError::ExternalTool {
                    tool: "recorder".into(),
                    status: "exit status: 1".into(),
                    stderr: "boom".into(),
                });
            }
            std::fs::write(&job.output, b"")?;
            self.jobs.push(job.clone());
            Ok(job.output.clone())
        }
    }

    fn sample_graph() -> (RenderGraph, NodeId) {
        let mut g = RenderGraph::new();
        let c4 = g.source("/bank/c4.mp4");
        let silence = g.source("/bank/silence.mp4");
        let note = g.add(RenderNode::Trim { input: c4, start: 0.0, end: 0.5 }).unwrap();
        let rest = g
            .add(RenderNode::Trim { input: silence, start: 0.0, end: 0.25 })
            .unwrap();
        let cat = g.add(RenderNode::Concat(vec![note, rest, note])).unwrap();
        let audio = g.add(RenderNode::ExtractAudio(cat)).unwrap();
        let root = g.add(RenderNode::Mux { video: cat, audio }).unwrap();
        (g, root)
    }

    #[test]
    fn shared_nodes_render_once() {
        let dir = tempfile::tempdir().unwrap();
        let (g, root) = sample_graph();
        let mut tool = Recorder::default();
        let output = dir.path().join("out.mp4");
        let mut eval = Evaluator::new(&g, &mut tool, dir.path(), "avi");
        eval.evaluate(root, &output).unwrap();

        // two trims, concat, extract-audio, mux; sources are free
        assert_eq!(eval.invocations(), 5);
        assert!(output.exists());
        drop(eval);
        let kinds: Vec<&str> = tool.jobs.iter().map(|j| j.op.name()).collect();
        assert_eq!(kinds, ["trim", "trim", "concat", "extract-audio", "mux"]);
    }

    #[test]
    fn jobs_see_their_inputs_rendered() {
        let dir = tempfile::tempdir().unwrap();
        let (g, root) = sample_graph();
        let mut tool = Recorder::default();
        let output = dir.path().join("out.mp4");
        Evaluator::new(&g, &mut tool, dir.path(), ".avi")
            .evaluate(root, &output)
            .unwrap();

        let concat = &tool.jobs[2];
        assert_eq!(concat.inputs.len(), 3);
        assert_eq!(concat.inputs[0], concat.inputs[2]);
        assert!(concat.inputs.iter().all(|p| p.exists()));
        assert_eq!(concat.output.extension().unwrap(), "avi");
        assert_eq!(tool.jobs[3].output.extension().unwrap(), "wav");
        assert_eq!(tool.jobs[4].output, output);
    }

    #[test]
    fn failure_stops_evaluation() {
        let dir = tempfile::tempdir().unwrap();
        let (g, root) = sample_graph();
        let mut tool = Recorder {
            fail_at: Some(2),
            ..Default::default()
        };
        let result = Evaluator::new(&g, &mut tool, dir.path(), "avi")
            .evaluate(root, &dir.path().join("out.mp4"));
        assert!(matches!(result, Err(RenderError::ExternalTool { .. })));
        assert_eq!(tool.jobs.len(), 2);
    }

    #[test]
    fn source_root_is_copied() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.mp4");
        std::fs::write(&input, b"clip").unwrap();
        let mut g = RenderGraph::new();
        let root = g.source(&input);
        let mut tool = Recorder::default();
        let output = dir.path().join("out.mp4");
        Evaluator::new(&g, &mut tool, dir.path(), "avi")
            .evaluate(root, &output)
            .unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"clip");
        assert!(tool.jobs.is_empty());
    }
}
