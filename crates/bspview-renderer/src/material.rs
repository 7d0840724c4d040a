//! Material registry.
//!
//! Materials are addressed by a small integer id that is packed into draw
//! list sort keys, so the registry never hands out more than
//! `MAX_MATERIALS` ids. Id 0 is the built-in world material used whenever a
//! name cannot be resolved.

use std::collections::HashMap;

use bspview_common::qfiles::{Contents, SurfFlags};

pub type MaterialId = u32;

/// Sort keys keep 12 bits of material id.
pub const MAX_MATERIALS: usize = 0x1000;

pub const WORLD_MATERIAL: MaterialId = 0;
pub const WORLD_MATERIAL_NAME: &str = "*world";

/// Coarse draw order class, packed into the top bits of the distance key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u32)]
pub enum ShaderSort {
    None = 0,
    Portal = 1,
    Sky = 2,
    #[default]
    Opaque = 3,
    Decal = 4,
    SeeThrough = 5,
    Banner = 6,
    Underwater = 8,
    Additive = 9,
    Nearest = 16,
    Weapon = 17,
    Weapon2 = 18,
}

/// Largest value the 5-bit sort field can hold.
pub const SHADER_SORT_MAX: u32 = 31;

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct MaterialFlags: u32 {
        /// Faces with this material produce no geometry.
        const DISCARD         = 0x1;
        /// Surfaces of different entities may share a batch.
        const ENTITY_MERGABLE = 0x2;
        /// Camera-facing: only the entity translation applies.
        const AUTOSPRITE      = 0x4;
        const DEPTH_WRITE     = 0x8;
        const DEPTH_READ      = 0x10;
        /// Decals are not projected onto these surfaces.
        const NO_MARKS        = 0x20;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub id: MaterialId,
    pub name: String,
    pub sort: ShaderSort,
    pub flags: MaterialFlags,
    /// Tie-break inside a sort class; 15 bits are kept.
    pub draw_order: u32,
    pub surf_flags: SurfFlags,
    pub contents: Contents,
}

impl Material {
    #[inline]
    pub fn depth_write(&self) -> bool {
        self.flags.contains(MaterialFlags::DEPTH_WRITE)
    }

    #[inline]
    pub fn depth_read(&self) -> bool {
        self.flags.contains(MaterialFlags::DEPTH_READ)
    }

    #[inline]
    pub fn discard(&self) -> bool {
        self.flags.contains(MaterialFlags::DISCARD)
    }

    /// Order value used for world surfaces in the distance key.
    #[inline]
    pub fn pack_order(&self) -> u32 {
        self.draw_order & 0x7FFF
    }
}

/// Description used to register a material.
#[derive(Debug, Clone, Default)]
pub struct MaterialDesc {
    pub sort: ShaderSort,
    pub flags: MaterialFlags,
    pub draw_order: u32,
    pub surf_flags: SurfFlags,
    pub contents: Contents,
}

impl MaterialDesc {
    pub fn opaque() -> Self {
        Self {
            sort: ShaderSort::Opaque,
            flags: MaterialFlags::DEPTH_WRITE | MaterialFlags::DEPTH_READ,
            ..Default::default()
        }
    }

    /// Derive a description from the flags stored in the map.
    pub fn from_bsp(surf_flags: SurfFlags, contents: Contents) -> Self {
        let mut desc = Self::opaque();
        desc.surf_flags = surf_flags;
        desc.contents = contents;

        if surf_flags.contains(SurfFlags::NODRAW) {
            desc.flags |= MaterialFlags::DISCARD;
        }
        if surf_flags.contains(SurfFlags::NOMARKS) {
            desc.flags |= MaterialFlags::NO_MARKS;
        }
        if surf_flags.contains(SurfFlags::SKY) {
            desc.sort = ShaderSort::Sky;
            desc.flags |= MaterialFlags::NO_MARKS;
        } else if contents.intersects(Contents::WATER | Contents::SLIME | Contents::LAVA) {
            desc.sort = ShaderSort::Underwater;
            desc.flags.remove(MaterialFlags::DEPTH_WRITE);
        }
        desc
    }
}

#[derive(Debug, Clone)]
pub struct MaterialRegistry {
    materials: Vec<Material>,
    by_name: HashMap<String, MaterialId>,
}

impl Default for MaterialRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MaterialRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            materials: Vec::new(),
            by_name: HashMap::new(),
        };
        registry.push(WORLD_MATERIAL_NAME, MaterialDesc::opaque());
        registry
    }

    fn push(&mut self, name: &str, desc: MaterialDesc) -> MaterialId {
        let id = self.materials.len() as MaterialId;
        self.materials.push(Material {
            id,
            name: name.to_string(),
            sort: desc.sort,
            flags: desc.flags,
            draw_order: desc.draw_order,
            surf_flags: desc.surf_flags,
            contents: desc.contents,
        });
        self.by_name.insert(name.to_ascii_lowercase(), id);
        id
    }

    /// Register `name`, or replace the description of an existing entry.
    ///
    /// Returns the world material once the registry is full.
    pub fn register(&mut self, name: &str, desc: MaterialDesc) -> MaterialId {
        if let Some(id) = self.find(name) {
            let m = &mut self.materials[id as usize];
            m.sort = desc.sort;
            m.flags = desc.flags;
            m.draw_order = desc.draw_order;
            m.surf_flags = desc.surf_flags;
            m.contents = desc.contents;
            return id;
        }
        if self.materials.len() >= MAX_MATERIALS {
            log::warn!("material registry full, {} falls back to {}", name, WORLD_MATERIAL_NAME);
            return WORLD_MATERIAL;
        }
        self.push(name, desc)
    }

    /// Case-insensitive lookup.
    pub fn find(&self, name: &str) -> Option<MaterialId> {
        self.by_name.get(&name.to_ascii_lowercase()).copied()
    }

    /// Lookup that falls back to the world material.
    pub fn find_material(&self, name: &str) -> MaterialId {
        self.find(name).unwrap_or(WORLD_MATERIAL)
    }

    /// Resolve a map material: an explicit registration wins, otherwise one
    /// is derived from the map's surface flags and contents.
    pub fn resolve_bsp_material(&mut self, name: &str, surf_flags: SurfFlags, contents: Contents) -> MaterialId {
        if name.is_empty() {
            return WORLD_MATERIAL;
        }
        match self.find(name) {
            Some(id) => id,
            None => self.register(name, MaterialDesc::from_bsp(surf_flags, contents)),
        }
    }

    #[inline]
    pub fn get(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id as usize)
    }

    pub fn world(&self) -> &Material {
        &self.materials[WORLD_MATERIAL as usize]
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Material> {
        self.materials.iter()
    }
}
