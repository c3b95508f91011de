//! The command queue and batching core.
//!
//! This module is deliberately device-free: it turns queued draw commands
//! into sorted, grouped, capacity-bounded sub-batches of geometry and hands
//! them to a [`BatchSink`]. The GL-facing side lives in
//! [`renderer`](crate::renderer); tests drive the exact same code through a
//! recording sink.
//!
//! # Flush pipeline
//!
//! 1. Stable-sort pending commands by (shader identity, texture identity),
//!    so program switches (the most expensive state change) are minimized
//!    and equal textures end up adjacent for slot reuse.
//! 2. Partition the sorted commands into per-shader runs, each found with a
//!    binary search rather than a linear scan.
//! 3. Per run: announce the shader once, then expand each command into
//!    4 vertices and 2 triangles, assigning texture slots first-come
//!    first-served with deduplication.
//! 4. A sub-batch is submitted early whenever the slot table is full and the
//!    next texture has no slot, or fewer than 4 vertex slots remain. This
//!    resets geometry cursors and the slot table, never the shader run.
//! 5. A trailing submission per run catches the remainder.
//!
//! Commands are transient: they never survive past the flush that consumes
//! them. None of these operations can fail; capacity handling keeps every
//! staging write in bounds by construction.

use glam::{Mat4, Vec4};

use crate::color::Color;
use crate::rect::Rect;
use crate::vertex::{TriangleIndices, Vertex};

/// The shader state a draw command carries: the program's device identity
/// (also the sort key) and its pre-resolved `projectionMatrix` location.
#[derive(Clone, Debug)]
pub(crate) struct ShaderBinding {
    pub program: glow::NativeProgram,
    pub projection_location: Option<glow::NativeUniformLocation>,
}

/// One queued request to draw a textured, colored, transformed quad.
#[derive(Clone, Debug)]
pub(crate) struct RenderCommand {
    pub transform: Mat4,
    pub texture_rect: Rect,
    pub color: Color,
    pub shader: ShaderBinding,
    pub texture: glow::NativeTexture,
}

/// Per-frame renderer counters, reset by `begin_frame`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Device draw calls issued this frame.
    pub batches: u64,
    /// Triangles produced this frame.
    pub triangles: u64,
    /// Vertices produced this frame.
    pub vertices: u64,
}

/// Receiver of flushed batches.
///
/// `begin_run` is called exactly once per shader run before any of the run's
/// geometry; `submit` once per sub-batch. Implementations must not assume
/// more than one `submit` per run or exactly one run per flush.
pub(crate) trait BatchSink {
    fn begin_run(&mut self, shader: &ShaderBinding, view_projection: &Mat4);
    fn submit(
        &mut self,
        vertices: &[Vertex],
        triangles: &[TriangleIndices],
        textures: &[glow::NativeTexture],
    );
}

/// Accumulates draw commands for one frame and flushes them as batches.
pub(crate) struct Batcher {
    max_commands: usize,
    vertex_capacity: usize,
    slot_capacity: usize,
    commands: Vec<RenderCommand>,
    vertices: Vec<Vertex>,
    triangles: Vec<TriangleIndices>,
    texture_slots: Vec<glow::NativeTexture>,
    view_projection: Mat4,
    stats: RenderStats,
}

impl Batcher {
    pub fn new(max_commands: usize, texture_slot_capacity: usize) -> Self {
        let vertex_capacity = max_commands * 4;
        Self {
            max_commands,
            vertex_capacity,
            slot_capacity: texture_slot_capacity,
            commands: Vec::with_capacity(max_commands),
            vertices: Vec::with_capacity(vertex_capacity),
            triangles: Vec::with_capacity(max_commands * 2),
            texture_slots: Vec::with_capacity(texture_slot_capacity),
            view_projection: Mat4::IDENTITY,
            stats: RenderStats::default(),
        }
    }

    /// Resets per-frame cursors and stats and fixes the view-projection
    /// matrix every shader run of this frame will receive.
    pub fn begin_frame(&mut self, view_projection: Mat4) {
        self.vertices.clear();
        self.triangles.clear();
        self.texture_slots.clear();
        self.stats = RenderStats::default();
        self.view_projection = view_projection;
    }

    /// Queues a command, flushing first if the queue is at capacity so the
    /// append always succeeds.
    pub fn draw(&mut self, command: RenderCommand, sink: &mut dyn BatchSink) {
        if self.commands.len() == self.max_commands {
            self.flush_commands(sink);
        }
        self.commands.push(command);
    }

    /// Flushes everything still queued. Idempotent once the queue is empty.
    pub fn end_frame(&mut self, sink: &mut dyn BatchSink) {
        self.flush_commands(sink);
        self.submit_pending(sink);
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    fn flush_commands(&mut self, sink: &mut dyn BatchSink) {
        if self.commands.is_empty() {
            return;
        }
        // Taking the queue sidesteps aliasing with the staging arrays below;
        // its allocation is handed back (cleared) at the end.
        let mut commands = std::mem::take(&mut self.commands);
        // TODO: sort differently for transparent shaders
        commands.sort_by_key(|command| {
            (command.shader.program.0.get(), command.texture.0.get())
        });

        let mut start = 0;
        while start < commands.len() {
            let program = commands[start].shader.program;
            let run_end =
                start + commands[start..].partition_point(|c| c.shader.program == program);

            self.vertices.clear();
            self.triangles.clear();
            self.texture_slots.clear();
            sink.begin_run(&commands[start].shader, &self.view_projection);
            for command in &commands[start..run_end] {
                self.append_quad(command, sink);
            }
            self.submit_pending(sink);

            start = run_end;
        }

        commands.clear();
        self.commands = commands;
    }

    /// Expands one command into 4 vertices and 2 triangles, submitting the
    /// pending sub-batch first when a capacity would be exceeded.
    fn append_quad(&mut self, command: &RenderCommand, sink: &mut dyn BatchSink) {
        let assigned = self
            .texture_slots
            .iter()
            .position(|&texture| texture == command.texture);
        let slots_exhausted =
            assigned.is_none() && self.texture_slots.len() == self.slot_capacity;
        let vertices_exhausted = self.vertex_capacity - self.vertices.len() < 4;
        if slots_exhausted || vertices_exhausted {
            self.submit_pending(sink);
        }
        // The slot table may just have been emptied; resolve again before
        // inserting.
        let slot = match self
            .texture_slots
            .iter()
            .position(|&texture| texture == command.texture)
        {
            Some(slot) => slot,
            None => {
                self.texture_slots.push(command.texture);
                self.texture_slots.len() - 1
            }
        };

        const CORNERS: [[f32; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]];
        let rect = command.texture_rect;
        let tex_coords = [
            [rect.left, rect.bottom],
            [rect.right, rect.bottom],
            [rect.right, rect.top],
            [rect.left, rect.top],
        ];
        let color = command.color.to_array();
        let base = self.vertices.len() as u32;
        for (corner, tex_coords) in CORNERS.iter().zip(tex_coords) {
            let position = command.transform * Vec4::new(corner[0], corner[1], 0.0, 1.0);
            self.vertices.push(Vertex {
                position: [position.x, position.y, position.z],
                color,
                tex_coords,
                tex_index: slot as u32,
            });
        }
        for i in 1..=2 {
            self.triangles.push(TriangleIndices::new(base, base + i, base + i + 1));
        }

        self.stats.vertices += 4;
        self.stats.triangles += 2;
    }

    /// Submits staged geometry as one sub-batch and resets the geometry
    /// cursors and the slot table. The active shader is left untouched:
    /// program state persists across sub-flushes within a run.
    fn submit_pending(&mut self, sink: &mut dyn BatchSink) {
        if self.vertices.is_empty() {
            return;
        }
        sink.submit(&self.vertices, &self.triangles, &self.texture_slots);
        self.vertices.clear();
        self.triangles.clear();
        self.texture_slots.clear();
        self.stats.batches += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU32;

    enum Event {
        Run {
            program: u32,
            view_projection: Mat4,
        },
        Submit {
            vertices: Vec<Vertex>,
            triangles: Vec<TriangleIndices>,
            textures: Vec<u32>,
        },
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Vec<Event>,
    }

    impl RecordingSink {
        fn submissions(&self) -> Vec<(&[Vertex], &[TriangleIndices], &[u32])> {
            self.events
                .iter()
                .filter_map(|event| match event {
                    Event::Submit {
                        vertices,
                        triangles,
                        textures,
                    } => Some((vertices.as_slice(), triangles.as_slice(), textures.as_slice())),
                    Event::Run { .. } => None,
                })
                .collect()
        }

        fn runs(&self) -> Vec<(u32, Mat4)> {
            self.events
                .iter()
                .filter_map(|event| match event {
                    Event::Run {
                        program,
                        view_projection,
                    } => Some((*program, *view_projection)),
                    Event::Submit { .. } => None,
                })
                .collect()
        }
    }

    impl BatchSink for RecordingSink {
        fn begin_run(&mut self, shader: &ShaderBinding, view_projection: &Mat4) {
            self.events.push(Event::Run {
                program: shader.program.0.get(),
                view_projection: *view_projection,
            });
        }

        fn submit(
            &mut self,
            vertices: &[Vertex],
            triangles: &[TriangleIndices],
            textures: &[glow::NativeTexture],
        ) {
            self.events.push(Event::Submit {
                vertices: vertices.to_vec(),
                triangles: triangles.to_vec(),
                textures: textures.iter().map(|texture| texture.0.get()).collect(),
            });
        }
    }

    fn shader(id: u32) -> ShaderBinding {
        ShaderBinding {
            program: glow::NativeProgram(NonZeroU32::new(id).unwrap()),
            projection_location: None,
        }
    }

    fn texture(id: u32) -> glow::NativeTexture {
        glow::NativeTexture(NonZeroU32::new(id).unwrap())
    }

    fn quad(shader_id: u32, texture_id: u32) -> RenderCommand {
        RenderCommand {
            transform: Mat4::IDENTITY,
            texture_rect: Rect::UNIT,
            color: Color::WHITE,
            shader: shader(shader_id),
            texture: texture(texture_id),
        }
    }

    fn frame(batcher: &mut Batcher, sink: &mut RecordingSink, commands: Vec<RenderCommand>) {
        batcher.begin_frame(Mat4::IDENTITY);
        for command in commands {
            batcher.draw(command, sink);
        }
        batcher.end_frame(sink);
    }

    #[test]
    fn produces_four_vertices_and_two_triangles_per_quad() {
        let mut batcher = Batcher::new(100, 32);
        let mut sink = RecordingSink::default();
        frame(&mut batcher, &mut sink, (0..37).map(|_| quad(1, 1)).collect());

        let stats = batcher.stats();
        assert_eq!(stats.vertices, 37 * 4);
        assert_eq!(stats.triangles, 37 * 2);

        let total_vertices: usize = sink.submissions().iter().map(|(v, _, _)| v.len()).sum();
        let total_indices: usize = sink.submissions().iter().map(|(_, t, _)| t.len() * 3).sum();
        assert_eq!(total_vertices, 37 * 4);
        assert_eq!(total_indices, 37 * 6);
    }

    #[test]
    fn single_quad_scenario() {
        let mut batcher = Batcher::new(100, 32);
        let mut sink = RecordingSink::default();
        frame(&mut batcher, &mut sink, vec![quad(1, 1)]);

        assert_eq!(
            batcher.stats(),
            RenderStats {
                batches: 1,
                triangles: 2,
                vertices: 4,
            }
        );

        let submissions = sink.submissions();
        assert_eq!(submissions.len(), 1);
        let (vertices, triangles, textures) = submissions[0];

        // Unit quad under the identity transform: corners in the order
        // bottom-left, bottom-right, top-right, top-left.
        let positions: Vec<[f32; 3]> = vertices.iter().map(|v| v.position).collect();
        assert_eq!(
            positions,
            [
                [-1.0, -1.0, 0.0],
                [1.0, -1.0, 0.0],
                [1.0, 1.0, 0.0],
                [-1.0, 1.0, 0.0],
            ]
        );
        let tex_coords: Vec<[f32; 2]> = vertices.iter().map(|v| v.tex_coords).collect();
        assert_eq!(tex_coords, [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]);
        assert!(vertices.iter().all(|v| v.tex_index == 0));

        // Two triangles fanned from the quad's first vertex.
        assert_eq!(
            triangles,
            [TriangleIndices::new(0, 1, 2), TriangleIndices::new(0, 2, 3)]
        );
        assert_eq!(textures, [1]);
    }

    #[test]
    fn index_fan_offsets_by_base_vertex() {
        let mut batcher = Batcher::new(100, 32);
        let mut sink = RecordingSink::default();
        frame(&mut batcher, &mut sink, vec![quad(1, 1), quad(1, 1)]);

        let submissions = sink.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(
            submissions[0].1,
            [
                TriangleIndices::new(0, 1, 2),
                TriangleIndices::new(0, 2, 3),
                TriangleIndices::new(4, 5, 6),
                TriangleIndices::new(4, 6, 7),
            ]
        );
    }

    #[test]
    fn sort_is_stable_for_equal_keys() {
        let mut batcher = Batcher::new(100, 32);
        let mut sink = RecordingSink::default();
        let commands = (0..5)
            .map(|i| RenderCommand {
                color: Color::rgba(i as f32 / 10.0, 0.0, 0.0, 1.0),
                ..quad(1, 1)
            })
            .collect();
        frame(&mut batcher, &mut sink, commands);

        let submissions = sink.submissions();
        assert_eq!(submissions.len(), 1);
        let reds: Vec<f32> = submissions[0]
            .0
            .iter()
            .step_by(4)
            .map(|v| v.color[0])
            .collect();
        assert_eq!(reds, [0.0, 0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn shader_runs_are_flushed_in_sort_order() {
        let mut batcher = Batcher::new(100, 32);
        let mut sink = RecordingSink::default();
        // Submitted out of shader order on purpose.
        frame(
            &mut batcher,
            &mut sink,
            vec![quad(2, 7), quad(1, 5), quad(2, 7), quad(1, 6)],
        );

        let kinds: Vec<&str> = sink
            .events
            .iter()
            .map(|event| match event {
                Event::Run { .. } => "run",
                Event::Submit { .. } => "submit",
            })
            .collect();
        assert_eq!(kinds, ["run", "submit", "run", "submit"]);
        assert_eq!(
            sink.runs().iter().map(|(p, _)| *p).collect::<Vec<_>>(),
            [1, 2]
        );

        // All of shader 1's geometry lands before any of shader 2's.
        let submissions = sink.submissions();
        assert_eq!(submissions[0].0.len(), 2 * 4);
        assert_eq!(submissions[0].2, [5, 6]);
        assert_eq!(submissions[1].0.len(), 2 * 4);
        assert_eq!(submissions[1].2, [7]);
        assert_eq!(batcher.stats().batches, 2);
    }

    #[test]
    fn texture_slots_are_deduplicated() {
        let mut batcher = Batcher::new(100, 32);
        let mut sink = RecordingSink::default();
        let commands = (0..12).map(|i| quad(1, 1 + i % 3)).collect();
        frame(&mut batcher, &mut sink, commands);

        let submissions = sink.submissions();
        assert_eq!(submissions.len(), 1);
        // 12 draws, 3 distinct textures, 3 slots.
        assert_eq!(submissions[0].2, [1, 2, 3]);
        assert!(submissions[0].0.iter().all(|v| v.tex_index < 3));
    }

    #[test]
    fn exhausted_slot_table_forces_a_sub_flush() {
        let mut batcher = Batcher::new(100, 2);
        let mut sink = RecordingSink::default();
        frame(
            &mut batcher,
            &mut sink,
            vec![quad(1, 1), quad(1, 2), quad(1, 3)],
        );

        let submissions = sink.submissions();
        assert_eq!(submissions.len(), 2);
        assert_eq!(submissions[0].2, [1, 2]);
        // The sub-flush reset the slot table, so the third texture gets
        // slot 0 of a fresh sub-batch.
        assert_eq!(submissions[1].2, [3]);
        assert!(submissions[1].0.iter().all(|v| v.tex_index == 0));
        assert_eq!(batcher.stats().batches, 2);
        // Only one run: the shader never changed.
        assert_eq!(sink.runs().len(), 1);
    }

    #[test]
    fn a_resident_texture_never_takes_a_second_slot() {
        let mut batcher = Batcher::new(100, 2);
        let mut sink = RecordingSink::default();
        // The slot table fills with textures 1 and 2; further draws with
        // either reuse their slots instead of flushing.
        let commands = (0..20).map(|i| quad(1, 1 + i % 2)).collect();
        frame(&mut batcher, &mut sink, commands);

        assert_eq!(sink.submissions().len(), 1);
        assert_eq!(sink.submissions()[0].2, [1, 2]);
    }

    #[test]
    fn low_vertex_capacity_forces_a_sub_flush() {
        let mut batcher = Batcher::new(100, 32);
        // Room for one quad and a spare vertex, but not for a second quad.
        batcher.vertex_capacity = 5;
        let mut sink = RecordingSink::default();
        frame(&mut batcher, &mut sink, vec![quad(1, 1), quad(1, 1)]);

        let submissions = sink.submissions();
        assert_eq!(submissions.len(), 2);
        assert_eq!(submissions[0].0.len(), 4);
        assert_eq!(submissions[1].0.len(), 4);
    }

    #[test]
    fn overflowing_the_command_queue_flushes_twice() {
        let mut batcher = Batcher::new(4, 32);
        let mut sink = RecordingSink::default();
        batcher.begin_frame(Mat4::IDENTITY);
        for _ in 0..5 {
            batcher.draw(quad(1, 1), &mut sink);
        }
        // The fifth draw overflowed the queue and forced an early flush.
        assert_eq!(sink.submissions().len(), 1);
        batcher.end_frame(&mut sink);

        assert_eq!(sink.submissions().len(), 2);
        assert_eq!(batcher.stats().batches, 2);
        assert_eq!(batcher.stats().vertices, 5 * 4);
    }

    #[test]
    fn end_frame_is_idempotent() {
        let mut batcher = Batcher::new(100, 32);
        let mut sink = RecordingSink::default();
        frame(&mut batcher, &mut sink, vec![quad(1, 1)]);

        let stats = batcher.stats();
        let events = sink.events.len();
        batcher.end_frame(&mut sink);
        assert_eq!(sink.events.len(), events);
        assert_eq!(batcher.stats(), stats);
    }

    #[test]
    fn empty_frame_submits_nothing() {
        let mut batcher = Batcher::new(100, 32);
        let mut sink = RecordingSink::default();
        frame(&mut batcher, &mut sink, vec![]);

        assert!(sink.events.is_empty());
        assert_eq!(batcher.stats(), RenderStats::default());
    }

    #[test]
    fn every_run_receives_the_current_frames_view_projection() {
        let mut batcher = Batcher::new(100, 32);
        let mut sink = RecordingSink::default();

        let first = Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0));
        batcher.begin_frame(first);
        batcher.draw(quad(1, 1), &mut sink);
        batcher.draw(quad(2, 2), &mut sink);
        batcher.end_frame(&mut sink);

        let second = Mat4::from_scale(glam::Vec3::splat(0.5));
        batcher.begin_frame(second);
        batcher.draw(quad(1, 1), &mut sink);
        batcher.end_frame(&mut sink);

        let runs = sink.runs();
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0].1, first);
        assert_eq!(runs[1].1, first);
        assert_eq!(runs[2].1, second);
    }

    #[test]
    fn transform_is_applied_to_the_unit_quad() {
        let mut batcher = Batcher::new(100, 32);
        let mut sink = RecordingSink::default();
        let transform = Mat4::from_translation(glam::Vec3::new(10.0, 20.0, 0.0));
        frame(
            &mut batcher,
            &mut sink,
            vec![RenderCommand {
                transform,
                ..quad(1, 1)
            }],
        );

        let positions: Vec<[f32; 3]> = sink.submissions()[0]
            .0
            .iter()
            .map(|v| v.position)
            .collect();
        assert_eq!(
            positions,
            [
                [9.0, 19.0, 0.0],
                [11.0, 19.0, 0.0],
                [11.0, 21.0, 0.0],
                [9.0, 21.0, 0.0],
            ]
        );
    }

    #[test]
    fn texture_rect_maps_to_vertex_tex_coords() {
        let mut batcher = Batcher::new(100, 32);
        let mut sink = RecordingSink::default();
        frame(
            &mut batcher,
            &mut sink,
            vec![RenderCommand {
                texture_rect: Rect::new(0.25, 0.5, 0.75, 1.0),
                ..quad(1, 1)
            }],
        );

        let tex_coords: Vec<[f32; 2]> = sink.submissions()[0]
            .0
            .iter()
            .map(|v| v.tex_coords)
            .collect();
        assert_eq!(
            tex_coords,
            [[0.25, 0.5], [0.75, 0.5], [0.75, 1.0], [0.25, 1.0]]
        );
    }
}
