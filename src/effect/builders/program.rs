use crate::{
    data_structures::config_node::ConfigNode,
    effect::{builders::BuildContext, pass::Pass},
    error::build_error,
    resources::{
        backend::ShaderStage,
        shader::{ProgramKey, ProgramParameters},
    },
};

/// Reads a `{name, index}` binding such as `attribute` or
/// `uniform-block-binding`.
fn binding(node: &ConfigNode, ctx: &BuildContext) -> anyhow::Result<(String, u32)> {
    let node = ctx.resolver.node(node)?;
    let name = ctx.resolver.child_string(node, "name")?;
    let index = ctx.resolver.child_i64(node, "index")?;
    match (name, index) {
        (Some(name), Some(index)) if index >= 0 => Ok((name, index as u32)),
        _ => build_error(
            format!("{} needs a name and a non-negative index", node.name()),
            "program",
        ),
    }
}

/// Builds the program key from a `program` block and fetches the shared
/// program from the cache.
pub fn build_program(
    pass: &mut Pass,
    prop: &ConfigNode,
    ctx: &BuildContext,
) -> anyhow::Result<()> {
    let node = ctx.resolver.node(prop)?;
    let r = &ctx.resolver;
    let mut key = ProgramKey {
        search_paths: ctx.search_path.dirs().to_vec(),
        ..Default::default()
    };
    let mut parameters = ProgramParameters::default();

    for child in node.children() {
        if let Some(stage) = ShaderStage::from_element(child.name()) {
            match r.value(child)?.as_str() {
                Some(file) if !file.is_empty() => key.shaders.push((file.to_string(), stage)),
                _ => return build_error(format!("empty {}", child.name()), "program"),
            }
            continue;
        }
        match child.name() {
            "attribute" => key.attributes.push(binding(child, ctx)?),
            "uniform-block-binding" => parameters.uniform_block_bindings.push(binding(child, ctx)?),
            "geometry-vertices-out" => {
                parameters.geometry_vertices_out = r.value(child)?.as_i64().map(|v| v as u32)
            }
            "geometry-input-type" => {
                parameters.geometry_input_type = r.value(child)?.as_str().map(str::to_string)
            }
            "geometry-output-type" => {
                parameters.geometry_output_type = r.value(child)?.as_str().map(str::to_string)
            }
            "active" => {}
            other => log::warn!("Effect {}: ignoring program child '{other}'", ctx.effect),
        }
    }
    if key.shaders.is_empty() {
        return build_error("program without shaders", "program");
    }
    key.parameters = parameters;

    let program = ctx.resources.programs.get_or_create(&key, ctx.backend)?;
    pass.program = Some(program);
    Ok(())
}
