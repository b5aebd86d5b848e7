//! Overload and member selection.
//!
//! Candidates are scored per argument: an exact type match costs nothing, any
//! other implicit conversion (numeric widening, lifting to nullable, reference
//! assignability, null to a nullable or reference parameter) costs one, and an
//! argument with no conversion rules the candidate out. The lowest total wins;
//! ties prefer the member declared on the most derived type.

use crate::errors::{ScriptError, ScriptResult};

use super::convert::convert_implicit;
use super::host::{HostTypeRef, Member, Signature};
use super::types::TypeTag;
use super::value::TypedValue;

/// Cost of passing `arg` where `param` is expected, or None if impossible
pub fn conversion_cost(arg: &TypedValue, param: &TypeTag) -> Option<u32> {
    if arg.is_null() {
        return (!param.is_value_type() || param.is_nullable()).then_some(1);
    }
    if arg.ty == *param {
        return Some(0);
    }
    convert_implicit(arg, param).map(|_| 1)
}

/// Total cost of calling `params` with `args`
pub fn signature_cost(params: &[TypeTag], args: &[TypedValue]) -> Option<u32> {
    if params.len() != args.len() {
        return None;
    }
    params
        .iter()
        .zip(args)
        .try_fold(0u32, |total, (param, arg)| {
            conversion_cost(arg, param).map(|cost| total + cost)
        })
}

/// Index of the cheapest applicable signature; the first one wins a tie
pub fn best_signature<'a>(
    signatures: impl IntoIterator<Item = &'a Signature>,
    args: &[TypedValue],
) -> Option<usize> {
    let mut best: Option<(usize, u32)> = None;
    for (index, sig) in signatures.into_iter().enumerate() {
        let Some(cost) = signature_cost(&sig.params, args) else {
            continue;
        };
        if best.map_or(true, |(_, lowest)| cost < lowest) {
            best = Some((index, cost));
        }
    }
    best.map(|(index, _)| index)
}

/// Pick the method or indexer among `candidates` that best fits `args`
pub fn select_member<'m>(
    owner: &HostTypeRef,
    candidates: &'m [Member],
    args: &[TypedValue],
) -> Option<&'m Member> {
    let mut best: Option<(&Member, u32, usize)> = None;
    for member in candidates {
        let Some(sig) = member.signature() else {
            continue;
        };
        let Some(cost) = signature_cost(&sig.params, args) else {
            continue;
        };
        let depth = owner
            .derivation_depth(&member.declaring_type)
            .unwrap_or(usize::MAX);
        let better = match best {
            None => true,
            Some((_, lowest, best_depth)) => cost < lowest || (cost == lowest && depth < best_depth),
        };
        if better {
            best = Some((member, cost, depth));
        }
    }
    best.map(|(member, _, _)| member)
}

/// The field or property named `name`, preferring the most derived declaration
pub fn resolve_member<'m>(
    owner: &HostTypeRef,
    members: &'m [Member],
    name: &str,
    is_static: bool,
) -> Option<&'m Member> {
    members
        .iter()
        .filter(|m| m.name == name && m.is_static == is_static && m.value_type().is_some())
        .min_by_key(|m| {
            owner
                .derivation_depth(&m.declaring_type)
                .unwrap_or(usize::MAX)
        })
}

/// Convert arguments to the parameter types of the selected signature
pub fn coerce_args(params: &[TypeTag], args: Vec<TypedValue>) -> ScriptResult<Vec<TypedValue>> {
    if params.len() != args.len() {
        return Err(ScriptError::bad_argument(format!(
            "expected {} arguments, got {}",
            params.len(),
            args.len()
        )));
    }
    params
        .iter()
        .zip(args)
        .map(|(param, arg)| {
            convert_implicit(&arg, param).ok_or_else(|| {
                ScriptError::bad_argument(format!(
                    "cannot convert argument of type '{}' to '{}'",
                    arg.ty, param
                ))
            })
        })
        .collect()
}

/// Convert a value for storage in a slot of type `ty`
pub fn coerce_value(value: TypedValue, ty: &TypeTag) -> ScriptResult<TypedValue> {
    convert_implicit(&value, ty).ok_or_else(|| {
        ScriptError::bad_argument(format!(
            "cannot assign a value of type '{}' to '{}'",
            value.ty, ty
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::host::HostType;

    struct Base {
        members: Vec<Member>,
    }

    impl HostType for Base {
        fn name(&self) -> &str {
            "Base"
        }

        fn members(&self) -> &[Member] {
            &self.members
        }
    }

    struct Derived {
        base: HostTypeRef,
        members: Vec<Member>,
    }

    impl HostType for Derived {
        fn name(&self) -> &str {
            "Derived"
        }

        fn base(&self) -> Option<HostTypeRef> {
            Some(self.base.clone())
        }

        fn members(&self) -> &[Member] {
            &self.members
        }
    }

    fn derived() -> HostTypeRef {
        let base = HostTypeRef::new(Base {
            members: vec![Member::field("Base", "Name", TypeTag::String)],
        });
        HostTypeRef::new(Derived {
            base,
            members: vec![
                Member::field("Base", "Name", TypeTag::String),
                Member::property("Derived", "Name", TypeTag::String, false),
                Member::method("Base", "Add", vec![TypeTag::Long], TypeTag::Long),
                Member::method("Derived", "Add", vec![TypeTag::Long], TypeTag::Long),
                Member::method("Base", "Add", vec![TypeTag::Int], TypeTag::Int),
            ],
        })
    }

    #[test]
    fn test_costs() {
        assert_eq!(conversion_cost(&TypedValue::from(1), &TypeTag::Int), Some(0));
        assert_eq!(conversion_cost(&TypedValue::from(1), &TypeTag::Double), Some(1));
        assert_eq!(
            conversion_cost(&TypedValue::from(1), &TypeTag::Int.nullable()),
            Some(1)
        );
        assert_eq!(conversion_cost(&TypedValue::null(), &TypeTag::String), Some(1));
        assert_eq!(conversion_cost(&TypedValue::null(), &TypeTag::Int), None);
        assert_eq!(conversion_cost(&TypedValue::from(1.0), &TypeTag::Int), None);
    }

    #[test]
    fn test_exact_match_beats_widening() {
        let ty = derived();
        let chosen = select_member(&ty, ty.members(), &[TypedValue::from(1)]).unwrap();
        assert_eq!(chosen.signature().unwrap().params, vec![TypeTag::Int]);
    }

    #[test]
    fn test_tie_prefers_most_derived() {
        let ty = derived();
        let chosen = select_member(&ty, ty.members(), &[TypedValue::from(1i64)]).unwrap();
        assert_eq!(chosen.declaring_type, "Derived");
        let field = resolve_member(&ty, ty.members(), "Name", false).unwrap();
        assert_eq!(field.declaring_type, "Derived");
    }

    #[test]
    fn test_no_applicable_candidate() {
        let ty = derived();
        assert!(select_member(&ty, ty.members(), &[TypedValue::from("x")]).is_none());
        assert!(select_member(&ty, ty.members(), &[]).is_none());
    }

    #[test]
    fn test_coerce_args_widens() {
        let args = coerce_args(&[TypeTag::Double], vec![TypedValue::from(2)]).unwrap();
        assert_eq!(args[0].ty, TypeTag::Double);
        assert!(coerce_args(&[TypeTag::Int], vec![TypedValue::from("x")]).is_err());
    }
}
