//! Vertex and lights records, as loaded by VTX and MOVEMEM.

/// Size of one `Vtx` record in bytes.
pub const VTX_SIZE: u32 = 16;

/// Size of the ambient part of a lights record.
pub const AMBIENT_SIZE: u32 = 8;

/// Size of one directional `Light`.
pub const LIGHT_SIZE: u32 = 16;

/// One vertex as the RSP reads it.
///
/// The last four bytes are either an RGBA color or a signed normal plus
/// alpha; the encoding does not distinguish them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Vtx {
    pub position: [i16; 3],
    /// S10.5 texture coordinate.
    pub uv: [i16; 2],
    pub shade: [u8; 4],
}

impl Vtx {
    pub fn to_bytes(&self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        for (i, component) in self.position.iter().enumerate() {
            bytes[i * 2..i * 2 + 2].copy_from_slice(&component.to_be_bytes());
        }
        // bytes 6..8: flag, always zero
        bytes[8..10].copy_from_slice(&self.uv[0].to_be_bytes());
        bytes[10..12].copy_from_slice(&self.uv[1].to_be_bytes());
        bytes[12..16].copy_from_slice(&self.shade);
        bytes
    }

    /// Array element initializer, `{{{x, y, z}, 0, {s, t}, {r, g, b, a}}}`.
    pub fn to_c(&self) -> String {
        let [x, y, z] = self.position;
        let [s, t] = self.uv;
        let [r, g, b, a] = self.shade;
        format!("{{{{{{{x}, {y}, {z}}}, 0, {{{s}, {t}}}, {{0x{r:02X}, 0x{g:02X}, 0x{b:02X}, 0x{a:02X}}}}}}}")
    }
}

/// One directional light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DirLight {
    pub color: [u8; 3],
    pub direction: [i8; 3],
}

/// Ambient light plus up to seven directional lights.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Lights {
    pub ambient: [u8; 3],
    pub directional: Vec<DirLight>,
}

impl Lights {
    /// Number of directional lights the record declares. A record without
    /// directional lights still stores one black light.
    pub fn count(&self) -> u8 {
        self.directional.len().max(1) as u8
    }

    /// C type name, `Lights1` .. `Lights7`.
    pub fn c_type(&self) -> String {
        format!("Lights{}", self.count())
    }

    pub fn byte_len(&self) -> u32 {
        AMBIENT_SIZE + u32::from(self.count()) * LIGHT_SIZE
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.byte_len() as usize);
        let [r, g, b] = self.ambient;
        bytes.extend_from_slice(&[r, g, b, 0, r, g, b, 0]);
        for light in self.lights() {
            let [r, g, b] = light.color;
            let [x, y, z] = light.direction.map(|d| d as u8);
            bytes.extend_from_slice(&[r, g, b, 0, r, g, b, 0, x, y, z, 0, 0, 0, 0, 0]);
        }
        bytes
    }

    /// `gdSPDefLightsN(ambient, color, direction, ...)`
    pub fn to_c(&self) -> String {
        let [ar, ag, ab] = self.ambient;
        let mut args = vec![format!("0x{ar:02X}, 0x{ag:02X}, 0x{ab:02X}")];
        for light in self.lights() {
            let [r, g, b] = light.color;
            let [x, y, z] = light.direction;
            args.push(format!("0x{r:02X}, 0x{g:02X}, 0x{b:02X}, {x}, {y}, {z}"));
        }
        format!("gdSPDefLights{}({})", self.count(), args.join(", "))
    }

    fn lights(&self) -> Vec<DirLight> {
        if self.directional.is_empty() {
            vec![DirLight {
                color: [0; 3],
                direction: [0; 3],
            }]
        } else {
            self.directional.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vtx_layout() {
        let v = Vtx {
            position: [-1, 2, 0x1234],
            uv: [32, -32],
            shade: [0xFF, 0x80, 0x00, 0x7F],
        };
        assert_eq!(
            v.to_bytes(),
            [
                0xFF, 0xFF, 0x00, 0x02, 0x12, 0x34, 0x00, 0x00, 0x00, 0x20, 0xFF, 0xE0, 0xFF,
                0x80, 0x00, 0x7F
            ]
        );
    }

    #[test]
    fn test_vtx_c_text() {
        let v = Vtx {
            position: [1, 2, 3],
            uv: [0, 1024],
            shade: [0xFF, 0xFF, 0xFF, 0xFF],
        };
        assert_eq!(
            v.to_c(),
            "{{{1, 2, 3}, 0, {0, 1024}, {0xFF, 0xFF, 0xFF, 0xFF}}}"
        );
    }

    #[test]
    fn test_lights_layout() {
        let lights = Lights {
            ambient: [0x7F, 0x7F, 0x7F],
            directional: vec![DirLight {
                color: [0xFE, 0xFE, 0xFE],
                direction: [0x28, 0x28, -0x28],
            }],
        };
        assert_eq!(lights.byte_len(), 24);
        assert_eq!(
            lights.to_bytes(),
            vec![
                0x7F, 0x7F, 0x7F, 0, 0x7F, 0x7F, 0x7F, 0, 0xFE, 0xFE, 0xFE, 0, 0xFE, 0xFE, 0xFE,
                0, 0x28, 0x28, 0xD8, 0, 0, 0, 0, 0
            ]
        );
        assert_eq!(
            lights.to_c(),
            "gdSPDefLights1(0x7F, 0x7F, 0x7F, 0xFE, 0xFE, 0xFE, 40, 40, -40)"
        );
    }

    #[test]
    fn test_empty_lights_store_black_light() {
        let lights = Lights {
            ambient: [0x20, 0x20, 0x20],
            directional: Vec::new(),
        };
        assert_eq!(lights.count(), 1);
        assert_eq!(lights.c_type(), "Lights1");
        assert_eq!(lights.to_bytes().len(), 24);
    }
}
