use crate::gfx::{GfxError, GraphicsDevice, ProgramId, UniformLocation, UniformValue};

use super::shader::ShaderUnit;
use super::texture::Texture;

/// Linked pipeline of one or more shader units.
///
/// Attribute names are bound to slots by position before linking:
/// `attribute_names[i]` reads from attribute slot `i`.
#[derive(Debug)]
pub struct ShaderProgram {
    id: ProgramId,
    label: String,
    units: Vec<ShaderUnit>,
    attributes: Vec<String>,
    alive: bool,
}

impl ShaderProgram {
    /// Creates, links and validates a program owning `units`.
    ///
    /// On failure the program and every unit are released.
    pub fn link<D>(
        device: &mut D,
        units: Vec<ShaderUnit>,
        attribute_names: &[&str],
    ) -> Result<Self, GfxError>
    where
        D: GraphicsDevice + ?Sized,
    {
        let label = units
            .iter()
            .map(ShaderUnit::label)
            .collect::<Vec<_>>()
            .join("+");

        let id = match device.create_program(&label) {
            Ok(id) => id,
            Err(e) => {
                let mut units = units;
                for unit in &mut units {
                    unit.destroy(device);
                }
                return Err(e);
            }
        };

        let mut program = Self {
            id,
            label,
            units,
            attributes: attribute_names.iter().map(|s| s.to_string()).collect(),
            alive: true,
        };

        if let Err(e) = program.build(device) {
            log::error!("program '{}' rejected: {e}", program.label);
            program.destroy(device);
            return Err(e);
        }

        log::debug!(
            "linked program '{}' #{} (attributes: {:?})",
            program.label,
            id.raw(),
            program.attributes
        );
        Ok(program)
    }

    fn build<D>(&self, device: &mut D) -> Result<(), GfxError>
    where
        D: GraphicsDevice + ?Sized,
    {
        for unit in &self.units {
            device.attach_shader(self.id, unit.id())?;
        }
        for (slot, name) in self.attributes.iter().enumerate() {
            device.bind_attribute_location(self.id, slot as u32, name)?;
        }
        device.link_program(self.id)?;
        device.validate_program(self.id)
    }

    pub fn uniform_location<D>(&self, device: &D, name: &str) -> Option<UniformLocation>
    where
        D: GraphicsDevice + ?Sized,
    {
        device.uniform_location(self.id, name)
    }

    /// Sets uniform `name` of the active program.
    ///
    /// Returns `Ok(false)` when the program declares no such uniform; the
    /// value is dropped in that case.
    pub fn set_uniform<D>(
        &self,
        device: &mut D,
        name: &str,
        value: impl Into<UniformValue>,
    ) -> Result<bool, GfxError>
    where
        D: GraphicsDevice + ?Sized,
    {
        match self.uniform_location(device, name) {
            Some(location) => {
                device.set_uniform(location, value.into())?;
                Ok(true)
            }
            None => {
                log::trace!("program '{}' has no uniform '{name}'", self.label);
                Ok(false)
            }
        }
    }

    pub fn activate<D>(&self, device: &mut D)
    where
        D: GraphicsDevice + ?Sized,
    {
        device.use_program(Some(self.id));
    }

    pub fn deactivate<D>(&self, device: &mut D)
    where
        D: GraphicsDevice + ?Sized,
    {
        device.use_program(None);
    }

    /// Makes `texture` available on texture unit `unit`.
    pub fn bind_texture<D>(&self, device: &mut D, unit: u32, texture: &Texture)
    where
        D: GraphicsDevice + ?Sized,
    {
        texture.bind(device, unit);
    }

    /// Deactivates, detaches and destroys every unit, then deletes the program.
    pub fn destroy<D>(&mut self, device: &mut D)
    where
        D: GraphicsDevice + ?Sized,
    {
        if !std::mem::take(&mut self.alive) {
            return;
        }

        device.use_program(None);
        for unit in &mut self.units {
            device.detach_shader(self.id, unit.id());
            unit.destroy(device);
        }
        device.delete_program(self.id);
        log::debug!("deleted program '{}'", self.label);
    }

    pub fn id(&self) -> ProgramId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn units(&self) -> &[ShaderUnit] {
        &self.units
    }

    /// Slot the attribute `name` was bound to.
    pub fn attribute_slot(&self, name: &str) -> Option<u32> {
        self.attributes
            .iter()
            .position(|a| a == name)
            .map(|slot| slot as u32)
    }
}

impl Drop for ShaderProgram {
    fn drop(&mut self) {
        if self.alive {
            log::warn!("program '{}' dropped without destroy", self.label);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::ShaderStage;
    use crate::gfx::recording::{Call, RecordingDevice, TEST_FRAGMENT_WGSL, TEST_VERTEX_WGSL};

    const ATTRIBUTES: [&str; 2] = ["vertex_Position", "screen_Position"];

    fn units(device: &mut RecordingDevice) -> Vec<ShaderUnit> {
        vec![
            ShaderUnit::compile(device, ShaderStage::Vertex, "vertex.wgsl", TEST_VERTEX_WGSL)
                .unwrap(),
            ShaderUnit::compile(device, ShaderStage::Fragment, "fragment.wgsl", TEST_FRAGMENT_WGSL)
                .unwrap(),
        ]
    }

    #[test]
    fn attribute_names_are_bound_by_position_before_link() {
        let mut device = RecordingDevice::new();
        let units = units(&mut device);
        device.clear_calls();

        let mut program = ShaderProgram::link(&mut device, units, &ATTRIBUTES).unwrap();
        let id = program.id().raw();
        let shader_ids: Vec<u32> = program.units().iter().map(|u| u.id().raw()).collect();

        assert_eq!(
            device.calls(),
            vec![
                Call::CreateProgram(id),
                Call::AttachShader { program: id, shader: shader_ids[0] },
                Call::AttachShader { program: id, shader: shader_ids[1] },
                Call::BindAttributeLocation {
                    program: id,
                    slot: 0,
                    name: "vertex_Position".into()
                },
                Call::BindAttributeLocation {
                    program: id,
                    slot: 1,
                    name: "screen_Position".into()
                },
                Call::LinkProgram(id),
                Call::ValidateProgram(id),
            ]
        );
        assert_eq!(program.attribute_slot("vertex_Position"), Some(0));
        assert_eq!(program.attribute_slot("screen_Position"), Some(1));
        assert_eq!(program.label(), "vertex.wgsl+fragment.wgsl");

        program.destroy(&mut device);
    }

    #[test]
    fn link_failure_releases_program_and_units() {
        let mut device = RecordingDevice::new();
        let units = units(&mut device);
        device.fail_link = true;

        let err = ShaderProgram::link(&mut device, units, &ATTRIBUTES).unwrap_err();

        assert!(matches!(err, GfxError::Link { .. }));
        assert_eq!(device.live_objects(), 0);
    }

    #[test]
    fn validation_failure_is_an_error_too() {
        let mut device = RecordingDevice::new();
        let units = units(&mut device);
        device.fail_validate = true;

        let err = ShaderProgram::link(&mut device, units, &ATTRIBUTES).unwrap_err();

        assert!(matches!(err, GfxError::Validate { .. }));
        assert_eq!(device.live_objects(), 0);
    }

    #[test]
    fn unknown_uniforms_are_reported_not_failed() {
        let mut device = RecordingDevice::new();
        let units = units(&mut device);
        let mut program = ShaderProgram::link(&mut device, units, &ATTRIBUTES).unwrap();
        program.activate(&mut device);
        device.clear_calls();

        assert!(program.set_uniform(&mut device, "screen_Height", 500.0f32).unwrap());
        assert!(!program.set_uniform(&mut device, "screen_Depth", 1.0f32).unwrap());

        assert_eq!(
            device.calls(),
            vec![Call::SetUniform {
                location: 1,
                value: UniformValue::Float(500.0)
            }]
        );

        program.destroy(&mut device);
    }

    #[test]
    fn destroy_deactivates_then_releases_units_then_program() {
        let mut device = RecordingDevice::new();
        let units = units(&mut device);
        let mut program = ShaderProgram::link(&mut device, units, &ATTRIBUTES).unwrap();
        let id = program.id().raw();
        let shader_ids: Vec<u32> = program.units().iter().map(|u| u.id().raw()).collect();
        device.clear_calls();

        program.destroy(&mut device);
        program.destroy(&mut device);

        assert_eq!(
            device.calls(),
            vec![
                Call::UseProgram(None),
                Call::DetachShader { program: id, shader: shader_ids[0] },
                Call::DeleteShader(shader_ids[0]),
                Call::DetachShader { program: id, shader: shader_ids[1] },
                Call::DeleteShader(shader_ids[1]),
                Call::DeleteProgram(id),
            ]
        );
        assert_eq!(device.live_objects(), 0);
    }

    #[test]
    fn a_single_stage_links_through_the_same_entry_point() {
        let mut device = RecordingDevice::new();
        let vertex =
            ShaderUnit::compile(&mut device, ShaderStage::Vertex, "vertex.wgsl", TEST_VERTEX_WGSL)
                .unwrap();

        let mut program = ShaderProgram::link(&mut device, vec![vertex], &ATTRIBUTES).unwrap();
        assert_eq!(program.units().len(), 1);

        program.destroy(&mut device);
    }
}
