use crate::gfx::{GfxError, GraphicsDevice, Topology, VertexArrayId};

use super::buffer::{Semantic, VertexBuffer};

/// A drawable set of vertex streams. Buffer `i` feeds attribute slot `i`.
#[derive(Debug)]
pub struct VertexArray {
    id: VertexArrayId,
    buffers: Vec<VertexBuffer>,
    alive: bool,
}

impl VertexArray {
    /// Takes ownership of `buffers` and attaches each one at its index.
    ///
    /// On failure every buffer and the array object are released before the
    /// error is returned.
    pub fn new<D>(device: &mut D, mut buffers: Vec<VertexBuffer>) -> Result<Self, GfxError>
    where
        D: GraphicsDevice + ?Sized,
    {
        let id = match device.create_vertex_array() {
            Ok(id) => id,
            Err(e) => {
                release_buffers(device, &mut buffers);
                return Err(e);
            }
        };

        device.bind_vertex_array(Some(id));
        let attached = buffers
            .iter()
            .enumerate()
            .try_for_each(|(slot, buffer)| buffer.bind_to_slot(device, slot as u32));
        device.bind_vertex_array(None);

        if let Err(e) = attached {
            device.delete_vertex_array(id);
            release_buffers(device, &mut buffers);
            return Err(e);
        }

        log::debug!("created vertex array #{} with {} streams", id.raw(), buffers.len());
        Ok(Self {
            id,
            buffers,
            alive: true,
        })
    }

    /// Draws every position stream with the other streams enabled alongside.
    ///
    /// Each `Position` buffer becomes one triangle-list draw of its own vertex
    /// count; the remaining slots are enabled as companion streams for every
    /// draw. Returns the number of draws issued.
    pub fn render<D>(&self, device: &mut D) -> Result<usize, GfxError>
    where
        D: GraphicsDevice + ?Sized,
    {
        if !self.alive {
            return Err(GfxError::InvalidHandle {
                kind: "vertex array",
                id: self.id.raw(),
            });
        }

        let companions: Vec<u32> = self
            .slots()
            .filter(|(_, buffer)| !buffer.is_position())
            .map(|(slot, _)| slot)
            .collect();

        device.bind_vertex_array(Some(self.id));

        let mut draws = 0;
        let mut result = Ok(());
        for (slot, buffer) in self.slots().filter(|(_, b)| b.is_position()) {
            device.enable_attribute(slot);
            for &companion in &companions {
                device.enable_attribute(companion);
            }

            result = device.draw_arrays(Topology::TriangleList, 0, buffer.vertex_count());

            device.disable_attribute(slot);
            for &companion in &companions {
                device.disable_attribute(companion);
            }

            if result.is_err() {
                break;
            }
            draws += 1;
        }

        device.bind_vertex_array(None);
        result.map(|()| draws)
    }

    /// Destroys the owned buffers, then the array object.
    pub fn destroy<D>(&mut self, device: &mut D)
    where
        D: GraphicsDevice + ?Sized,
    {
        if std::mem::take(&mut self.alive) {
            release_buffers(device, &mut self.buffers);
            device.delete_vertex_array(self.id);
            log::debug!("deleted vertex array #{}", self.id.raw());
        }
    }

    pub fn id(&self) -> VertexArrayId {
        self.id
    }

    pub fn buffers(&self) -> &[VertexBuffer] {
        &self.buffers
    }

    /// Slot of the first buffer tagged `semantic`.
    pub fn slot_of(&self, semantic: &Semantic) -> Option<u32> {
        self.slots()
            .find(|(_, buffer)| buffer.semantic() == Some(semantic))
            .map(|(slot, _)| slot)
    }

    fn slots(&self) -> impl Iterator<Item = (u32, &VertexBuffer)> {
        self.buffers
            .iter()
            .enumerate()
            .map(|(slot, buffer)| (slot as u32, buffer))
    }
}

impl Drop for VertexArray {
    fn drop(&mut self) {
        if self.alive {
            log::warn!("vertex array #{} dropped without destroy", self.id.raw());
        }
    }
}

fn release_buffers<D>(device: &mut D, buffers: &mut [VertexBuffer])
where
    D: GraphicsDevice + ?Sized,
{
    for buffer in buffers {
        buffer.destroy(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::VertexFormat;
    use crate::gfx::recording::{Call, RecordingDevice};

    fn buffer(device: &mut RecordingDevice, semantic: Option<Semantic>, count: u32) -> VertexBuffer {
        let data = vec![0.0f32; 4 * count as usize];
        VertexBuffer::new(device, semantic, data.as_slice(), 4, count).unwrap()
    }

    #[test]
    fn buffers_are_attached_at_their_index() {
        let mut device = RecordingDevice::new();
        let buffers = vec![
            buffer(&mut device, Some(Semantic::Position), 3),
            buffer(&mut device, Some(Semantic::Color), 3),
            buffer(&mut device, None, 3),
        ];
        let ids: Vec<u32> = buffers.iter().map(|b| b.id().raw()).collect();
        device.clear_calls();

        let mut array = VertexArray::new(&mut device, buffers).unwrap();
        let format = VertexFormat::new(crate::gfx::ScalarType::Float, 4);

        assert_eq!(
            device.calls(),
            vec![
                Call::CreateVertexArray(array.id().raw()),
                Call::BindVertexArray(Some(array.id().raw())),
                Call::VertexAttribute { slot: 0, buffer: ids[0], format },
                Call::VertexAttribute { slot: 1, buffer: ids[1], format },
                Call::VertexAttribute { slot: 2, buffer: ids[2], format },
                Call::BindVertexArray(None),
            ]
        );
        assert_eq!(array.slot_of(&Semantic::Color), Some(1));
        assert_eq!(array.slot_of(&Semantic::Normal), None);

        array.destroy(&mut device);
    }

    #[test]
    fn one_position_buffer_draws_a_triangle_list_of_its_vertices() {
        let mut device = RecordingDevice::new();
        let position = buffer(&mut device, Some(Semantic::Position), 4);
        let mut array = VertexArray::new(&mut device, vec![position]).unwrap();
        device.clear_calls();

        assert_eq!(array.render(&mut device).unwrap(), 1);
        assert_eq!(
            device.calls(),
            vec![
                Call::BindVertexArray(Some(array.id().raw())),
                Call::EnableAttribute(0),
                Call::DrawArrays {
                    topology: Topology::TriangleList,
                    first: 0,
                    count: 4
                },
                Call::DisableAttribute(0),
                Call::BindVertexArray(None),
            ]
        );

        array.destroy(&mut device);
    }

    #[test]
    fn companions_are_enabled_with_every_position_draw() {
        let mut device = RecordingDevice::new();
        let buffers = vec![
            buffer(&mut device, Some(Semantic::Position), 6),
            buffer(&mut device, None, 6),
            buffer(&mut device, Some(Semantic::Position), 3),
        ];
        let mut array = VertexArray::new(&mut device, buffers).unwrap();
        device.clear_calls();

        assert_eq!(array.render(&mut device).unwrap(), 2);

        let calls = device.calls();
        let draws: Vec<u32> = calls
            .iter()
            .filter_map(|c| match c {
                Call::DrawArrays { count, .. } => Some(*count),
                _ => None,
            })
            .collect();
        assert_eq!(draws, vec![6, 3]);
        assert_eq!(
            &calls[1..4],
            &[
                Call::EnableAttribute(0),
                Call::EnableAttribute(1),
                Call::DrawArrays {
                    topology: Topology::TriangleList,
                    first: 0,
                    count: 6
                },
            ]
        );

        array.destroy(&mut device);
    }

    #[test]
    fn no_position_buffer_means_no_draw() {
        let mut device = RecordingDevice::new();
        let color = buffer(&mut device, Some(Semantic::Color), 3);
        let mut array = VertexArray::new(&mut device, vec![color]).unwrap();
        device.clear_calls();

        assert_eq!(array.render(&mut device).unwrap(), 0);
        assert!(
            !device
                .calls()
                .iter()
                .any(|c| matches!(c, Call::DrawArrays { .. }))
        );

        array.destroy(&mut device);
    }

    #[test]
    fn destroy_cascades_to_buffers_then_the_array() {
        let mut device = RecordingDevice::new();
        let a = buffer(&mut device, Some(Semantic::Position), 3);
        let b = buffer(&mut device, None, 3);
        let (a_id, b_id) = (a.id().raw(), b.id().raw());
        let mut array = VertexArray::new(&mut device, vec![a, b]).unwrap();
        device.clear_calls();

        array.destroy(&mut device);
        array.destroy(&mut device);

        assert_eq!(
            device.calls(),
            vec![
                Call::DeleteBuffer(a_id),
                Call::DeleteBuffer(b_id),
                Call::DeleteVertexArray(array.id().raw()),
            ]
        );
        assert_eq!(device.live_objects(), 0);
        assert!(array.render(&mut device).is_err());
    }
}
