// Grid layout engine.
//
// N voice timelines go into a `size x size` grid with `size = ceil(sqrt(N))`.
// Voices are placed busiest first (most seconds of actual sound), row-major:
// cell `i` sits at row `i / size`, column `i % size`. Cells past the last
// voice are filled with a silent timeline so the canvas is always square.
//
// The render graph built here, per cell and then overall:
//
//   Source(clip) -> Trim -> ... -> Concat -> Scale(cell size)
//   Overlay(all scaled cells on a blank canvas)
//   Concat -> ExtractAudio  (voice cells only) -> Mix
//   Mux(Overlay, Mix)       cut to the shorter stream
//
// Every segment becomes a Trim node, even one spanning its whole clip, so
// all Concat inputs share one encoding. Interning in `RenderGraph` collapses
// repeated (clip, length) pairs and identical padding cells.

use serde::{Deserialize, Serialize};

use crate::error::RenderError;
use crate::graph::{NodeId, RenderGraph, RenderNode};
use crate::timeline::Timeline;

/// Smallest `size` with `size * size >= voices`.
pub fn grid_size(voices: usize) -> usize {
    let mut size = 0;
    while size * size < voices {
        size += 1;
    }
    size
}

/// `(row, column)` of cell `index` in a grid `size` cells wide.
pub fn cell_coords(index: usize, size: usize) -> (usize, usize) {
    (index / size, index % size)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridLayout {
    pub size: usize,
    pub cell_width: u32,
    pub cell_height: u32,
}

impl GridLayout {
    pub fn new(voices: usize, cell_width: u32, cell_height: u32) -> Self {
        GridLayout {
            size: grid_size(voices),
            cell_width,
            cell_height,
        }
    }

    pub fn cells(&self) -> usize {
        self.size * self.size
    }

    /// Pixel size of the whole grid.
    pub fn canvas(&self) -> (u32, u32) {
        let size = self.size as u32;
        (size * self.cell_width, size * self.cell_height)
    }

    /// Pixel offset of cell `index`'s top-left corner.
    pub fn position(&self, index: usize) -> (u32, u32) {
        let (row, col) = cell_coords(index, self.size);
        (col as u32 * self.cell_width, row as u32 * self.cell_height)
    }
}

/// Sort voices busiest first. Ties keep their original order.
pub fn order_by_sound_length(timelines: &mut [Timeline]) {
    timelines.sort_by(|a, b| b.sound_length.total_cmp(&a.sound_length));
}

/// Build the render graph for a grid of `voices`, already in cell order.
/// `padding` fills the cells past the last voice. Returns the graph and the
/// id of its root (the final muxed video).
pub fn build_grid_graph(
    voices: &[Timeline],
    padding: &Timeline,
    layout: &GridLayout,
    color: &str,
) -> Result<(RenderGraph, NodeId), RenderError> {
    if voices.is_empty() {
        return Err(RenderError::NothingToRender);
    }

    let mut graph = RenderGraph::new();
    let mut cells = Vec::with_capacity(layout.cells());
    let mut audio = Vec::with_capacity(voices.len());
    for index in 0..layout.cells() {
        let timeline = voices.get(index).unwrap_or(padding);
        let clip = timeline_node(&mut graph, timeline)?;
        cells.push(graph.add(RenderNode::Scale {
            input: clip,
            width: layout.cell_width,
            height: layout.cell_height,
        })?);
        if index < voices.len() {
            audio.push(graph.add(RenderNode::ExtractAudio(clip))?);
        }
    }

    let video = graph.add(RenderNode::Overlay {
        positions: (0..cells.len()).map(|i| layout.position(i)).collect(),
        cells,
        canvas: layout.canvas(),
        color: color.to_string(),
    })?;
    let audio = graph.add(RenderNode::Mix(audio))?;
    let root = graph.add(RenderNode::Mux { video, audio })?;
    Ok((graph, root))
}

/// Concat of one Trim per segment.
fn timeline_node(graph: &mut RenderGraph, timeline: &Timeline) -> Result<NodeId, RenderError> {
    let mut parts = Vec::with_capacity(timeline.segments.len());
    for segment in &timeline.segments {
        let source = graph.source(&segment.clip);
        parts.push(graph.add(RenderNode::Trim {
            input: source,
            start: segment.in_point,
            end: segment.out_point,
        })?);
    }
    graph.add(RenderNode::Concat(parts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::Segment;
    use std::collections::HashSet;
    use std::path::PathBuf;

    fn timeline(clip: &str, length: f64, sound: f64) -> Timeline {
        Timeline {
            segments: vec![Segment {
                clip: PathBuf::from(clip),
                in_point: 0.0,
                out_point: length,
            }],
            sound_length: sound,
            ..Timeline::default()
        }
    }

    #[test]
    fn grid_sizes() {
        let sizes: Vec<usize> = [0, 1, 2, 4, 5, 9, 10, 16, 17].map(grid_size).to_vec();
        assert_eq!(sizes, [0, 1, 2, 2, 3, 3, 4, 4, 5]);
    }

    #[test]
    fn coordinates_are_unique_and_in_range() {
        for n in 1..=50 {
            let size = grid_size(n);
            let coords: HashSet<(usize, usize)> = (0..n).map(|i| cell_coords(i, size)).collect();
            assert_eq!(coords.len(), n);
            assert!(coords.iter().all(|&(r, c)| r < size && c < size));
        }
    }

    #[test]
    fn pixel_positions() {
        let layout = GridLayout::new(5, 320, 180);
        assert_eq!(layout.size, 3);
        assert_eq!(layout.canvas(), (960, 540));
        assert_eq!(layout.position(0), (0, 0));
        assert_eq!(layout.position(4), (320, 180));
        assert_eq!(layout.position(8), (640, 360));
    }

    #[test]
    fn busiest_voice_goes_first() {
        let mut voices = vec![
            timeline("a", 2.0, 0.5),
            timeline("b", 2.0, 1.5),
            timeline("c", 2.0, 0.5),
            timeline("d", 2.0, 2.0),
        ];
        order_by_sound_length(&mut voices);
        let order: Vec<&str> = voices
            .iter()
            .map(|t| t.segments[0].clip.to_str().unwrap())
            .collect();
        assert_eq!(order, ["d", "b", "a", "c"]);
    }

    #[test]
    fn grid_graph_shape() {
        let voices = vec![
            timeline("/bank/c4.mp4", 1.0, 1.0),
            timeline("/bank/e4.mp4", 1.0, 1.0),
            timeline("/bank/g4.mp4", 1.0, 1.0),
        ];
        let padding = timeline("/bank/silence.mp4", 1.0, 0.0);
        let layout = GridLayout::new(voices.len(), 100, 50);
        let (graph, root) = build_grid_graph(&voices, &padding, &layout, "black").unwrap();

        let RenderNode::Mux { video, audio } = graph.node(root).unwrap() else {
            panic!("root is not a mux");
        };
        let RenderNode::Overlay {
            cells,
            positions,
            canvas,
            ..
        } = graph.node(*video).unwrap()
        else {
            panic!("video is not an overlay");
        };
        assert_eq!(cells.len(), 4);
        assert_eq!(*canvas, (200, 100));
        assert_eq!(positions, &vec![(0, 0), (100, 0), (0, 50), (100, 50)]);
        let RenderNode::Mix(tracks) = graph.node(*audio).unwrap() else {
            panic!("audio is not a mix");
        };
        assert_eq!(tracks.len(), 3);
        // 4 sources, 4 trims, 4 concats, 4 scales, 3 extracts, overlay, mix, mux
        assert_eq!(graph.len(), 22);
    }

    #[test]
    fn padding_cells_share_nodes() {
        let voices = vec![timeline("/bank/c4.mp4", 1.0, 1.0), timeline("/bank/e4.mp4", 1.0, 1.0)];
        let padding = timeline("/bank/silence.mp4", 1.0, 0.0);
        let layout = GridLayout::new(voices.len(), 10, 10);
        let (graph, root) = build_grid_graph(&voices, &padding, &layout, "black").unwrap();
        let order = graph.topological_order(root).unwrap();
        let scales = order
            .iter()
            .filter(|&&id| matches!(graph.node(id).unwrap(), RenderNode::Scale { .. }))
            .count();
        assert_eq!(scales, 3);
    }

    #[test]
    fn no_voices_is_an_error() {
        let padding = timeline("/bank/silence.mp4", 1.0, 0.0);
        let layout = GridLayout::new(0, 10, 10);
        assert!(matches!(
            build_grid_graph(&[], &padding, &layout, "black"),
            Err(RenderError::NothingToRender)
        ));
    }
}
