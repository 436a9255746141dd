use crate::dag::validate_extension;
use crate::errors::PatchError;
use crate::repair::RepairPatch;
use std::slice;
use voyage_common::{Plan, StepStatus};

/// Apply one patch to the plan store.
pub fn apply_patch(plan: &mut Plan, patch: &RepairPatch) -> Result<(), PatchError> {
    match patch {
        RepairPatch::Modify { step_id, arg_delta } => {
            let step = plan
                .get_mut(step_id)
                .ok_or_else(|| PatchError::UnknownStep(step_id.clone()))?;
            step.args.merge(arg_delta);
            step.status = StepStatus::Pending;
            Ok(())
        }
        RepairPatch::Remove { step_id } => plan
            .remove(step_id)
            .map(|_| ())
            .ok_or_else(|| PatchError::UnknownStep(step_id.clone())),
        RepairPatch::Add { step } => {
            validate_extension(plan, slice::from_ref(step))?;
            let mut step = step.clone();
            step.status = StepStatus::Pending;
            plan.push(step);
            Ok(())
        }
    }
}
