pub mod analyze;
pub mod context;
pub mod deco;
pub mod densify;
pub mod error;
pub mod ffi;
pub mod format;
pub mod gas;
pub mod limits;
pub mod models;
pub mod physiology;
pub mod prefs;
pub mod pressure;
pub mod profile;
pub mod sac;
pub mod series;
pub mod units;

uniffi::setup_scaffolding!();

pub use context::AnalysisContext;
pub use deco::{DecoSnapshot, DecoState, PlannerLock, SharedDecoModel, PLANNER_LOCK};
pub use error::{ProfileError, ProfileResult};
pub use ffi::{ProfileAnalysis, ProfileFfiError, ProfilePoint};
pub use format::{compare_entries, format_comparison, point_summary, summary_at_time, Comparison};
pub use gas::GasMix;
pub use models::{Cylinder, Dive, DiveComputer, DiveMode, Event, Sample};
pub use prefs::{DecoModel, DecoPrefs, ProfilePrefs};
pub use profile::{analyze_dive, create_plot_info, plot_context};
pub use series::{DenseEntry, DenseSeries, DiveType, Velocity};
