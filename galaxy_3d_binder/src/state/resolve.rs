/// Multisample resolve with the surrounding state transitions

use crate::error::{Error, Result};
use crate::graphics_device::CommandList;
use crate::state::{ResourceAccessState, SubresourceRange, TrackedResource};
use crate::engine_raise;

const SOURCE: &str = "galaxy3d::StateTracker";

/// Resolve `src` into `dst`, then put `dst` back in the state it was in
///
/// Records: `src` -> `ResolveSource` and `dst` -> `ResolveDest` (one batch),
/// the resolve itself, then `dst` back to its prior state. Both resources are
/// borrowed exclusively for the whole sequence.
///
/// Returns the number of barriers recorded.
///
/// # Errors
///
/// - `InvalidResource` if `src` is not multisampled, `dst` is, either is not
///   a texture, or `dst` is not entirely in `ColorOutput` or `ShaderRead`
/// - `UseBeforeInit` if either resource has no backing allocation
pub fn resolve(src: &mut TrackedResource, dst: &mut TrackedResource, command_list: &mut dyn CommandList) -> Result<usize> {
    // Surface missing allocations before the sample checks
    src.extent()?;
    let prior = match dst.uniform_state()? {
        Some(state @ (ResourceAccessState::ColorOutput | ResourceAccessState::ShaderRead)) => state,
        other => {
            return Err(engine_raise!(SOURCE, Error::InvalidResource(format!(
                "resolve target '{}' must be a render target or shader input, found {}",
                dst.name(),
                other.map_or_else(|| "mixed states".to_string(), |state| state.to_string())
            ))))
        }
    };

    let (src_texture, dst_texture) = match (src.texture_object(), dst.texture_object()) {
        (Some(s), Some(d)) => (s.clone(), d.clone()),
        _ => {
            return Err(engine_raise!(SOURCE, Error::InvalidResource(format!(
                "resolve needs two textures ('{}' -> '{}')",
                src.name(),
                dst.name()
            ))))
        }
    };
    if src.sample_count() <= 1 {
        return Err(engine_raise!(SOURCE, Error::InvalidResource(format!(
            "resolve source '{}' is not multisampled",
            src.name()
        ))));
    }
    if dst.sample_count() != 1 {
        return Err(engine_raise!(SOURCE, Error::InvalidResource(format!(
            "resolve target '{}' has {} samples",
            dst.name(),
            dst.sample_count()
        ))));
    }

    let mut barriers = src.transition_if_needed(ResourceAccessState::ResolveSource, SubresourceRange::ALL)?;
    barriers.extend(dst.transition_if_needed(ResourceAccessState::ResolveDest, SubresourceRange::ALL)?);
    if !barriers.is_empty() {
        command_list.resource_barriers(&barriers)?;
    }

    command_list.resolve_texture(src_texture.as_ref(), dst_texture.as_ref())?;

    let after = dst.request_transition(prior, SubresourceRange::ALL)?;
    command_list.resource_barriers(&after)?;

    Ok(barriers.len() + after.len())
}
