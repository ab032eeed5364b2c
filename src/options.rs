//! Configuration of the octagon analysis.

use crate::machine::MachineModel;

/// Options controlling the transfer relation and the analysis driver.
///
/// # Example
///
/// ```rust
/// use octagon_rs::options::OctagonOptions;
///
/// let options = OctagonOptions::default()
///     .with_track_float_variables(true)
///     .with_max_iterations(500);
/// assert!(options.track_float_variables);
/// assert_eq!(options.entry_function, "main");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OctagonOptions {
    /// Track float variables with outward-rounded integer bounds.
    /// When disabled, float expressions cannot be computed.
    pub track_float_variables: bool,
    /// Program entry; its return statements are ignored.
    pub entry_function: String,
    /// Name prefix of temporaries introduced while linearizing expressions.
    pub temp_var_prefix: String,
    /// Local name of the synthetic return-value slot of every function.
    pub return_var_name: String,
    pub machine_model: MachineModel,
    /// Widen instead of join when merging at loop heads.
    pub widen_at_loop_heads: bool,
    /// Bound on the number of worklist iterations of the driver.
    pub max_iterations: usize,
}

impl Default for OctagonOptions {
    fn default() -> Self {
        Self {
            track_float_variables: false,
            entry_function: "main".to_string(),
            temp_var_prefix: "__oct_tmp_".to_string(),
            return_var_name: "__retval__".to_string(),
            machine_model: MachineModel::Linux64,
            widen_at_loop_heads: true,
            max_iterations: 10_000,
        }
    }
}

impl OctagonOptions {
    pub fn with_track_float_variables(mut self, track: bool) -> Self {
        self.track_float_variables = track;
        self
    }

    pub fn with_entry_function(mut self, name: impl Into<String>) -> Self {
        self.entry_function = name.into();
        self
    }

    pub fn with_temp_var_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.temp_var_prefix = prefix.into();
        self
    }

    pub fn with_return_var_name(mut self, name: impl Into<String>) -> Self {
        self.return_var_name = name.into();
        self
    }

    pub fn with_machine_model(mut self, model: MachineModel) -> Self {
        self.machine_model = model;
        self
    }

    pub fn with_widen_at_loop_heads(mut self, widen: bool) -> Self {
        self.widen_at_loop_heads = widen;
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }
}
