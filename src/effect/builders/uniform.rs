use crate::{
    data_structures::config_node::{ConfigNode, Value},
    effect::{builders::BuildContext, pass::Pass, property::EffectValue},
    error::build_error,
    resources::uniform::{UniformSource, UniformType},
};

fn infer_type(value: &Value) -> Option<UniformType> {
    Some(match value {
        Value::Bool(_) => UniformType::Bool,
        Value::Int(_) => UniformType::Int,
        Value::Float(_) | Value::Double(_) => UniformType::Float,
        Value::Vec2(_) => UniformType::FloatVec2,
        Value::Vec3(_) => UniformType::FloatVec3,
        Value::Vec4(_) => UniformType::FloatVec4,
        Value::String(_) | Value::None => return None,
    })
}

/// Builds a `uniform` block through the uniform cache.
///
/// A value reached through a parameter that itself points at a live property
/// yields a live uniform; anything else is fixed at build time.
pub fn build_uniform(
    pass: &mut Pass,
    prop: &ConfigNode,
    ctx: &BuildContext,
) -> anyhow::Result<()> {
    let node = ctx.resolver.node(prop)?;
    let r = &ctx.resolver;
    let Some(name) = r.child_string(node, "name")? else {
        return build_error("uniform without a name", "uniform");
    };
    let Some(value_node) = node.child("value") else {
        return build_error(format!("uniform {name} has no value"), "uniform");
    };
    let source = match r.resolve(value_node)? {
        EffectValue::Literal(leaf) => UniformSource::Static(leaf.value().clone()),
        EffectValue::Live(path) => UniformSource::Live(path),
        EffectValue::Branch(_) => {
            return build_error(format!("uniform {name} value is not a leaf"), "uniform");
        }
    };
    let ty = match r.child_string(node, "type")? {
        Some(type_name) => match UniformType::from_name(&type_name) {
            Some(ty) => ty,
            None => {
                return build_error(
                    format!("uniform {name} has unknown type '{type_name}'"),
                    "uniform",
                );
            }
        },
        None => match &source {
            UniformSource::Static(v) => match infer_type(v) {
                Some(ty) => ty,
                None => return build_error(format!("uniform {name} needs a type"), "uniform"),
            },
            UniformSource::Live(_) => {
                return build_error(format!("live uniform {name} needs a type"), "uniform");
            }
        },
    };
    if let UniformSource::Static(v) = &source {
        if ty.coerce(v).is_none() {
            return build_error(
                format!("uniform {name}: '{v}' is not a valid {ty:?}"),
                "uniform",
            );
        }
    }

    let uniform = ctx.resources.uniforms.get_or_create(
        &name,
        ty,
        source,
        ctx.effect,
        &ctx.resources.deferred_listeners,
    )?;
    let positioned = r.child_bool(node, "positioned")?.unwrap_or(false);
    if positioned && !pass.positioned_uniforms.contains(&name) {
        pass.positioned_uniforms.push(name.clone());
    }
    pass.uniforms.insert(name, uniform);
    Ok(())
}
