/// Object table capacity.
pub const NUM_OBJECTS: usize = 2048;
/// First slot handed out when a program is created without an explicit index.
pub const NUM_ENTITIES: usize = 2000;
/// Slot of the bootstrap program.
pub const BOOTSTRAP: usize = 2000;
/// Name of the bootstrap program resource.
pub const BOOTSTRAP_PROGRAM: &str = "start";
/// Value stack size in cells.
pub const VM_STACK_CELLS: usize = 4096;
/// Maximum depth of a program's parent chain.
pub const MAX_INHERITANCE_DEPTH: usize = 16;
/// Nested handler frames allowed by default. Every SEND, PASS and JSR
/// recurses on the host stack, so this must fit a 2 MiB thread in debug builds.
pub const MAX_CALL_DEPTH: usize = 32;

pub const MSG_CREATE: u32 = 0;
pub const MSG_DESTROY: u32 = 1;
pub const MSG_RESTORE: u32 = 2;

/// The game whose resource file is being run. Dungeon Hack adds its own
/// intrinsics on top of the Eye of the Beholder III set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GameVariant {
    #[default]
    Eob3,
    DungeonHack,
}

impl GameVariant {
    /// Conventional resource file name.
    pub fn resource_file(self) -> &'static str {
        match self {
            GameVariant::Eob3 => "eye.res",
            GameVariant::DungeonHack => "hack.res",
        }
    }
}

/// Behaviour switches for matching other interpreters bit for bit.
/// The default reproduces the shipped interpreter.
#[derive(Debug, Clone, Copy)]
pub struct Quirks {
    /// After storing a byte, `SAB` also performs `SAW` using the two bytes
    /// that follow its operand, skipping them.
    pub sab_falls_through: bool,
}

impl Default for Quirks {
    fn default() -> Self {
        Self { sab_falls_through: true }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub variant: GameVariant,
    pub max_objects: usize,
    pub entity_limit: usize,
    pub stack_cells: usize,
    pub max_call_depth: usize,
    /// Instructions a single top-level `execute` may run. `None` is unlimited.
    pub instruction_budget: Option<u64>,
    pub rng_seed: u64,
    pub quirks: Quirks,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            variant: GameVariant::Eob3,
            max_objects: NUM_OBJECTS,
            entity_limit: NUM_ENTITIES,
            stack_cells: VM_STACK_CELLS,
            max_call_depth: MAX_CALL_DEPTH,
            instruction_budget: None,
            rng_seed: 0x5eed_ae50,
            quirks: Quirks::default(),
        }
    }
}
