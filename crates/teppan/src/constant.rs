/// # Defaults with reserved meanings in Teppan

/// Sampling temperature used when none is supplied
pub const DEFAULT_TEMPERATURE: f64 = 0.2;

/// Nucleus-sampling threshold used when none is supplied
pub const DEFAULT_TOP_P: f64 = 0.95;

/// Longest token sequence (prompt plus generation) an engine accepts by default
pub const DEFAULT_MAX_SEQ_LEN: usize = 512;

/// Number of prompts an engine accepts in one submission by default
pub const DEFAULT_MAX_BATCH_SIZE: usize = 8;

/// Column holding the row identifier, in both the input and output tables
pub const ID_COLUMN: &str = "id";

/// Column holding the generated text in the output table
pub const RESULT_COLUMN: &str = "result";

/// Columns interpolated into the instruction template, in template order
pub const TEMPLATE_FIELDS: [&str; 4] = ["architecture", "code", "performance", "task"];
