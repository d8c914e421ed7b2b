//! Native functions callable from bytecode through `C:` imports.

mod geometry;
mod math;
mod string;
mod system;

use std::collections::HashMap;

pub use math::Rng;

use crate::{Engine, ExecutionState, GameVariant, IntrinsicError, Value, memory};

pub type IntrinsicFn = fn(&mut IntrinsicContext<'_>, &[Value]) -> Result<Value, IntrinsicError>;

/// Index of an intrinsic in its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IntrinsicId(pub u16);

#[derive(Debug, Clone, Copy)]
pub struct IntrinsicDesc {
    pub name: &'static str,
    /// `None` for names the engine knows but cannot run (graphics, sound,
    /// input, save files).
    pub func: Option<IntrinsicFn>,
}

/// What an intrinsic can reach while it runs: the engine (objects, thunks,
/// resources, RNG) and the execution state of the calling handler.
pub struct IntrinsicContext<'a> {
    pub engine: &'a mut Engine,
    pub state: &'a mut ExecutionState,
}

impl IntrinsicContext<'_> {
    pub fn read_string(&self, addr: Value) -> Result<Vec<u8>, IntrinsicError> {
        Ok(memory::read_c_string(&*self.engine, &*self.state, addr.as_addr()?)?)
    }

    pub fn write_string(&mut self, addr: Value, text: &[u8]) -> Result<(), IntrinsicError> {
        Ok(memory::write_c_string(&mut *self.engine, &mut *self.state, addr.as_addr()?, text)?)
    }
}

/// Fail with [`IntrinsicError::Arity`] unless exactly `expected` arguments
/// were passed.
pub(crate) fn arity(name: &'static str, args: &[Value], expected: usize) -> Result<(), IntrinsicError> {
    if args.len() != expected {
        return Err(IntrinsicError::Arity {
            name,
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

/// Name to function table. Lookups ignore ASCII case.
#[derive(Debug)]
pub struct IntrinsicRegistry {
    variant: GameVariant,
    table: Vec<IntrinsicDesc>,
    by_name: HashMap<String, IntrinsicId, ahash::RandomState>,
}

impl IntrinsicRegistry {
    pub fn new(variant: GameVariant) -> Self {
        let mut registry = Self {
            variant,
            table: Vec::new(),
            by_name: HashMap::default(),
        };
        registry.register_all(BASE_INTRINSICS);
        if variant == GameVariant::DungeonHack {
            registry.register_all(HACK_INTRINSICS);
        }
        log::debug!("registered {} intrinsics for {variant:?}", registry.table.len());
        registry
    }

    fn register_all(&mut self, names: &[&'static str]) {
        for &name in names {
            self.register(name, lookup_builtin(name));
        }
    }

    /// Add or replace an intrinsic. Replacing keeps the existing id.
    pub fn register(&mut self, name: &'static str, func: Option<IntrinsicFn>) -> IntrinsicId {
        let key = name.to_ascii_lowercase();
        if let Some(&id) = self.by_name.get(&key) {
            self.table[id.0 as usize] = IntrinsicDesc { name, func };
            return id;
        }
        let id = IntrinsicId(self.table.len() as u16);
        self.table.push(IntrinsicDesc { name, func });
        self.by_name.insert(key, id);
        id
    }

    pub fn lookup(&self, name: &str) -> Option<IntrinsicId> {
        self.by_name.get(&name.to_ascii_lowercase()).copied()
    }

    pub fn get(&self, id: IntrinsicId) -> Option<&IntrinsicDesc> {
        self.table.get(id.0 as usize)
    }

    pub fn variant(&self) -> GameVariant {
        self.variant
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (IntrinsicId, &IntrinsicDesc)> {
        self.table
            .iter()
            .enumerate()
            .map(|(i, desc)| (IntrinsicId(i as u16), desc))
    }
}

fn lookup_builtin(name: &str) -> Option<IntrinsicFn> {
    let func: IntrinsicFn = match name {
        "copy_string" => string::copy_string,
        "cat_string" => string::cat_string,
        "string_force_lower" => string::string_force_lower,
        "string_force_upper" => string::string_force_upper,
        "string_len" => string::string_len,
        "string_compare" => string::string_compare,
        "strval" => string::strval,
        "pokemem" | "peekmem" => system::stub_minus_one,
        "rnd" => math::rnd,
        "dice" => math::dice,
        "absv" => math::absv,
        "minv" => math::minv,
        "maxv" => math::maxv,
        "seed_random" => math::seed_random,
        "create_program" => system::create_program,
        "destroy_object" => system::destroy_object,
        "flush_cache" | "thrash_cache" => system::flush_cache,
        "step_X" => geometry::step_x,
        "step_Y" => geometry::step_y,
        "step_FDIR" => geometry::step_fdir,
        "step_square_X" => geometry::step_square_x,
        "step_square_Y" => geometry::step_square_y,
        "step_region" => geometry::step_region,
        "distance" => geometry::distance,
        "seek_direction" => geometry::seek_direction,
        _ => return None,
    };
    Some(func)
}

/// Eye of the Beholder III intrinsics, in table order.
const BASE_INTRINSICS: &[&str] = &[
    "load_string", "load_resource", "copy_string", "string_force_lower",
    "string_force_upper", "string_len", "string_compare", "beep", "strval",
    "envval", "pokemem", "peekmem", "rnd", "dice", "absv", "minv", "maxv",
    "diagnose", "heapfree", "notify", "cancel", "drain_event_queue",
    "post_event", "send_event", "peek_event", "dispatch_event",
    "flush_event_queue", "flush_input_events", "init_interface",
    "shutdown_interface", "set_mouse_pointer", "set_wait_pointer",
    "standby_cursor", "resume_cursor", "show_mouse", "hide_mouse", "mouse_XY",
    "mouse_in_window", "lock_mouse", "unlock_mouse", "getkey", "init_graphics",
    "draw_dot", "draw_line", "line_to", "draw_rectangle", "fill_rectangle",
    "hash_rectangle", "get_bitmap_height", "draw_bitmap", "visible_bitmap_rect",
    "set_palette", "refresh_window", "wipe_window", "shutdown_graphics",
    "wait_vertical_retrace", "read_palette", "write_palette", "pixel_fade",
    "color_fade", "light_fade", "assign_window", "assign_subwindow",
    "release_window", "get_x1", "get_x2", "get_y1", "get_y2", "set_x1",
    "set_x2", "set_y1", "set_y2", "text_window", "text_style", "text_xy",
    "text_color", "text_refresh_window", "get_text_x", "get_text_y", "home",
    "print", "sprint", "dprint", "aprint", "crout", "char_width",
    "font_height", "solid_bar_graph", "init_sound", "shutdown_sound",
    "load_sound_block", "sound_effect", "play_sequence", "load_music",
    "unload_music", "set_sound_status", "create_object", "create_program",
    "destroy_object", "thrash_cache", "flush_cache", "step_X", "step_Y",
    "step_FDIR", "step_square_X", "step_square_Y", "step_region", "distance",
    "seek_direction", "spell_request", "spell_list", "magic_field", "do_dots",
    "do_ice", "read_save_directory", "savegame_title", "write_save_directory",
    "save_game", "suspend_game", "resume_items", "resume_level",
    "change_level", "restore_items", "restore_level_objects",
    "read_initial_items", "write_initial_tempfiles",
    "create_initial_binary_files", "launch", "open_transfer_file",
    "close_transfer_file", "player_attrib", "item_attrib", "arrow_count",
];

/// Added on top of the base table by Dungeon Hack.
const HACK_INTRINSICS: &[&str] = &[
    "build_clipping", "cat_string", "close_feature_file", "close_file",
    "copy_window", "create_file", "delete_saves", "draw_auto_square",
    "draw_walls", "explode_save", "find_location_for_map",
    "get_feature_record", "init_viewspace", "load_level_map",
    "load_visibility", "lock_resource", "long2hex", "open_feature_file",
    "open_file", "output_time", "page_flip", "pause", "prepare_save",
    "printer_on_line", "randomize_array", "read_array_from_file",
    "read_number_from_file", "refresh_main_text_window", "roll_chance",
    "save_visibility", "seed_random", "seek_in_file", "sequence_playing",
    "text_background", "touch", "transition", "unlock_resource", "update_file",
    "walkheap", "window_core", "write_array_to_file", "write_long_to_file",
    "write_mapheader_to_file", "write_resource_to_file", "xmsallocated",
    "xmsfree",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_ignore_case() {
        let registry = IntrinsicRegistry::new(GameVariant::Eob3);
        let id = registry.lookup("step_X").unwrap();
        assert_eq!(registry.lookup("STEP_x"), Some(id));
        assert_eq!(registry.get(id).unwrap().name, "step_X");
        assert_eq!(registry.lookup("load_string"), Some(IntrinsicId(0)));
        assert!(registry.lookup("nope").is_none());
    }

    #[test]
    fn hack_extends_the_base_table() {
        let eob3 = IntrinsicRegistry::new(GameVariant::Eob3);
        let hack = IntrinsicRegistry::new(GameVariant::DungeonHack);
        assert_eq!(eob3.len(), BASE_INTRINSICS.len());
        assert_eq!(hack.len(), BASE_INTRINSICS.len() + HACK_INTRINSICS.len());
        assert!(eob3.lookup("seed_random").is_none());
        assert_eq!(hack.lookup("rnd"), eob3.lookup("rnd"));
        assert!(hack.get(hack.lookup("cat_string").unwrap()).unwrap().func.is_some());
    }

    #[test]
    fn device_intrinsics_have_no_function() {
        let registry = IntrinsicRegistry::new(GameVariant::Eob3);
        let draw = registry.lookup("draw_bitmap").unwrap();
        assert!(registry.get(draw).unwrap().func.is_none());
        let dice = registry.lookup("dice").unwrap();
        assert!(registry.get(dice).unwrap().func.is_some());
    }

    #[test]
    fn register_replaces_in_place() {
        fn answer(_: &mut IntrinsicContext<'_>, _: &[Value]) -> Result<Value, IntrinsicError> {
            Ok(Value::from_i32(42))
        }
        let mut registry = IntrinsicRegistry::new(GameVariant::Eob3);
        let before = registry.lookup("beep").unwrap();
        assert_eq!(registry.register("beep", Some(answer)), before);
        assert!(registry.get(before).unwrap().func.is_some());
        let len = registry.len();
        registry.register("extra", Some(answer));
        assert_eq!(registry.len(), len + 1);
    }
}
