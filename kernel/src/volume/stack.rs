//! Volume Stack

use super::*;
use smallvec::SmallVec;

/// Default capacity of a volume stack.
pub const VOLUME_STACK_SIZE: usize = 32;

/// One participating medium the path is currently inside.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct VolumeStackEntry {
    /// Owning object; `OBJECT_NONE` for the world volume.
    pub object: ObjectId,

    /// Volume shader.
    pub shader: ShaderId,

    /// Distance along the volume ray where the medium was entered.
    pub t_enter: Float,

    /// Distance where it was left; `INFINITY` while unresolved.
    pub t_exit: Float,

    /// Nesting depth for self-overlapping geometry.
    pub depth: u32,
}

impl VolumeStackEntry {
    /// Returns a freshly entered medium.
    ///
    /// * `object`  - Owning object.
    /// * `shader`  - Volume shader.
    /// * `t_enter` - Entry distance.
    pub fn new(object: ObjectId, shader: ShaderId, t_enter: Float) -> Self {
        Self {
            object,
            shader,
            t_enter,
            t_exit: INFINITY,
            depth: 1,
        }
    }

    /// Returns true once the exit distance is known.
    pub fn has_exit(&self) -> bool {
        self.t_exit < INFINITY
    }
}

/// Result of a volume stack update.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VolumeStackUpdate {
    /// A new entry was appended.
    Entered,

    /// An existing entry was re-entered.
    Reentered,

    /// The stack was full and the medium was ignored.
    Dropped,

    /// An entry was exited or removed.
    Exited,

    /// No entry belongs to the object.
    NotFound,
}

/// Ordered stack of the media a path is inside, oldest entry first.
#[derive(Clone, Debug)]
pub struct VolumeStack {
    entries: SmallVec<[VolumeStackEntry; VOLUME_STACK_SIZE]>,
    capacity: usize,
    growable: bool,
}

impl VolumeStack {
    /// Returns an empty stack.
    ///
    /// * `capacity` - Maximum number of entries before growing or dropping.
    /// * `growable` - Whether a full stack may grow.
    pub fn new(capacity: usize, growable: bool) -> Self {
        Self {
            entries: SmallVec::new(),
            capacity: max(capacity, 1),
            growable,
        }
    }

    /// Enters the world volume.
    ///
    /// * `shader` - Volume shader of the world.
    pub fn push_world(&mut self, shader: ShaderId) {
        if self.reserve_one() {
            self.entries.push(VolumeStackEntry::new(OBJECT_NONE, shader, 0.0));
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the path is outside every medium.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The entries, oldest first.
    pub fn entries(&self) -> &[VolumeStackEntry] {
        &self.entries
    }

    /// Returns the entry of an object.
    ///
    /// * `object` - The object.
    pub fn find(&self, object: ObjectId) -> Option<&VolumeStackEntry> {
        self.entries.iter().find(|e| e.object == object)
    }

    /// Makes room for one more entry. Returns false if the stack is full
    /// and may not grow.
    fn reserve_one(&mut self) -> bool {
        if self.entries.len() < self.capacity {
            true
        } else if self.growable {
            self.capacity += VOLUME_STACK_SIZE;
            self.entries.reserve(VOLUME_STACK_SIZE);
            true
        } else {
            false
        }
    }

    /// Records that the volume ray entered the medium of `object` at `t`.
    /// The open entry of the object is re-entered if there is one. Failing
    /// that, a closed entry whose recorded span contains `t` is reopened;
    /// otherwise a new entry is appended. At most one entry per object is
    /// open at any time.
    ///
    /// * `object` - Object entered.
    /// * `shader` - Its volume shader.
    /// * `t`      - Distance along the volume ray.
    pub fn enter(&mut self, object: ObjectId, shader: ShaderId, t: Float) -> VolumeStackUpdate {
        let index = self
            .entries
            .iter()
            .position(|e| e.object == object && e.depth > 0)
            .or_else(|| {
                self.entries
                    .iter()
                    .position(|e| e.object == object && e.t_enter <= t && t <= e.t_exit)
            });
        if let Some(i) = index {
            self.entries[i].depth += 1;
            return VolumeStackUpdate::Reentered;
        }

        if !self.reserve_one() {
            warn!(
                "Volume stack full ({} entries); ignoring volume of object {}",
                self.capacity, object
            );
            return VolumeStackUpdate::Dropped;
        }

        self.entries.push(VolumeStackEntry::new(object, shader, t));
        VolumeStackUpdate::Entered
    }

    /// Records that the volume ray left the medium of `object` at `t`, on
    /// the most recent open entry of the object. Exit distances never move
    /// backwards; a smaller `t` is clamped.
    ///
    /// * `object` - Object exited.
    /// * `t`      - Distance along the volume ray.
    pub fn exit(&mut self, object: ObjectId, t: Float) -> VolumeStackUpdate {
        let index = self
            .entries
            .iter()
            .rposition(|e| e.object == object && e.depth > 0)
            .or_else(|| self.entries.iter().rposition(|e| e.object == object));
        match index {
            Some(i) => {
                let entry = &mut self.entries[i];
                if entry.depth > 0 {
                    entry.depth -= 1;
                }
                if entry.has_exit() && t < entry.t_exit {
                    debug!(
                        "Volume exit out of order for object {}: {} < {}",
                        object, t, entry.t_exit
                    );
                } else if t < entry.t_enter {
                    debug!(
                        "Volume exit before entry for object {}: {} < {}",
                        object, t, entry.t_enter
                    );
                    entry.t_exit = entry.t_enter;
                } else {
                    entry.t_exit = t;
                }
                VolumeStackUpdate::Exited
            }
            None => VolumeStackUpdate::NotFound,
        }
    }

    /// Removes the entry of an object.
    ///
    /// * `object` - The object.
    pub fn remove(&mut self, object: ObjectId) -> VolumeStackUpdate {
        match self.entries.iter().position(|e| e.object == object) {
            Some(i) => {
                self.entries.remove(i);
                VolumeStackUpdate::Exited
            }
            None => VolumeStackUpdate::NotFound,
        }
    }

    /// Simple enter/exit used where distances do not matter: front faces
    /// push the medium, back faces remove it.
    ///
    /// * `sd` - Shading data of the crossed surface.
    pub fn enter_exit(&mut self, sd: &ShaderData) -> VolumeStackUpdate {
        if !sd.shader_flag.contains(ShaderFlags::HAS_VOLUME) {
            return VolumeStackUpdate::NotFound;
        }

        if sd.is_backfacing() {
            self.remove(sd.object)
        } else if self.find(sd.object).is_some() {
            VolumeStackUpdate::Reentered
        } else if self.reserve_one() {
            self.entries
                .push(VolumeStackEntry::new(sd.object, sd.shader, 0.0));
            VolumeStackUpdate::Entered
        } else {
            warn!(
                "Volume stack full ({} entries); ignoring volume of object {}",
                self.capacity, sd.object
            );
            VolumeStackUpdate::Dropped
        }
    }

    /// Drops media whose exit was resolved and that are no longer nested,
    /// then rebases the remaining spans on the new volume ray origin.
    pub fn compact(&mut self) {
        self.entries.retain(|e| !(e.has_exit() && e.depth == 0));
        self.reset_spans();
    }

    /// Rebases every span on a new volume ray origin.
    pub fn reset_spans(&mut self) {
        for e in self.entries.iter_mut() {
            e.t_enter = 0.0;
            if e.depth > 0 {
                e.t_exit = INFINITY;
            }
        }
    }

    /// Drops every object medium when the ray escapes the scene, whether
    /// its exit was recorded or not. Only the world volume is kept, so an
    /// escaping segment is integrated through the world medium alone.
    pub fn release_open(&mut self) {
        self.entries.retain(|e| e.object == OBJECT_NONE);
    }

    /// Restricts the stack of a branch that scattered at distance `t`:
    /// media entered after `t` are dropped, media exited before `t` are
    /// closed and the rest are rebased on the scatter point.
    ///
    /// * `t` - Scatter distance along the volume ray.
    pub fn branch_at(&mut self, t: Float) {
        self.entries
            .retain(|e| e.t_enter <= t && !(e.has_exit() && e.t_exit <= t));
        for e in self.entries.iter_mut() {
            e.t_enter = 0.0;
            e.t_exit = INFINITY;
            e.depth = max(e.depth, 1);
        }
    }

    /// Returns true if any medium on the stack needs ray marching.
    ///
    /// * `volumes` - Volume system classifying the shaders.
    pub fn is_heterogeneous(&self, volumes: &dyn VolumeSystem) -> bool {
        self.entries.iter().any(|e| volumes.is_heterogeneous(e.shader))
    }

    /// Returns the sampling method of the stack. Mixed methods combine into
    /// multiple importance sampling.
    ///
    /// * `volumes` - Volume system classifying the shaders.
    pub fn sampling_method(&self, volumes: &dyn VolumeSystem) -> VolumeSampling {
        let mut method = None;
        for e in self.entries.iter() {
            let m = volumes.sampling_method(e.shader);
            match method {
                None => method = Some(m),
                Some(prev) if prev != m => return VolumeSampling::MultipleImportance,
                _ => {}
            }
        }
        method.unwrap_or(VolumeSampling::Distance)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
