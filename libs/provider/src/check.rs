use crate::error::ProviderError;
use crate::provider::{Instance, Provider};

/// Which of fetch/prepare an instance still needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionRequirements {
    pub fetch_required: bool,
    pub prepare_required: bool,
}

/// Ask the provider what is missing. A required fetch implies a prepare.
pub async fn check_requirements(
    provider: &dyn Provider,
    inst: &Instance,
) -> Result<ActionRequirements, ProviderError> {
    if provider.is_fetch_needed(inst).await? {
        return Ok(ActionRequirements {
            fetch_required: true,
            prepare_required: true,
        });
    }

    Ok(ActionRequirements {
        fetch_required: false,
        prepare_required: provider.is_prepare_needed(inst).await?,
    })
}
