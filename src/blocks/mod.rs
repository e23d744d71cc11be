//! Standard block catalog.
//!
//! A small set of block kinds covering literals, operators, variables,
//! control flow and site access. Hosts may register their own kinds on top
//! or start from an empty [`BlockRegistry`](crate::BlockRegistry).

mod control;
mod services;
mod values;
mod variables;

pub use control::{ControlsIf, ControlsRepeat, ControlsScope, ScriptFail};
pub use services::{LogTag, ScriptChild, SiteCall};
pub use values::{
    LogicBoolean, LogicCompare, LogicNegate, LogicNull, LogicOperation, MathArithmetic,
    MathNumber, Text, TextJoin,
};
pub use variables::{VariablesGet, VariablesSet, VariablesSetGlobal};

use crate::registry::BlockRegistry;

/// Register every standard kind on `registry`.
pub fn register_standard(registry: &mut BlockRegistry) {
    registry.register_kind::<MathNumber>("math_number");
    registry.register_kind::<Text>("text");
    registry.register_kind::<LogicBoolean>("logic_boolean");
    registry.register_kind::<LogicNull>("logic_null");
    registry.register_kind::<MathArithmetic>("math_arithmetic");
    registry.register_kind::<LogicCompare>("logic_compare");
    registry.register_kind::<LogicOperation>("logic_operation");
    registry.register_kind::<LogicNegate>("logic_negate");
    registry.register_kind::<TextJoin>("text_join");

    registry.register_kind::<VariablesGet>("variables_get");
    registry.register_kind::<VariablesSet>("variables_set");
    registry.register_kind::<VariablesSetGlobal>("variables_set_global");

    registry.register_kind::<ControlsIf>("controls_if");
    registry.register_kind::<ControlsRepeat>("controls_repeat_ext");
    registry.register_kind::<ControlsRepeat>("controls_repeat");
    registry.register_kind::<ControlsScope>("controls_scope");
    registry.register_kind::<ScriptFail>("script_fail");

    registry.register_kind::<SiteCall>("site_call");
    registry.register_kind::<ScriptChild>("script_child");
    registry.register_kind::<LogTag>("log_tag");
}
