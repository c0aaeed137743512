pub const DEFAULT_MAX_TURNS: usize = 8;
