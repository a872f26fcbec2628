use std::any::type_name;

/// Get the name of the type with its module prefix stripped.
pub fn simple_type_name<T>() -> String
where
    T: ?Sized,
{
    let name = type_name::<T>();
    // Generic parameters may themselves contain `::`, so only look at the outer path.
    let outer = name.split('<').next().unwrap_or(name);
    outer.rsplit("::").next().unwrap_or(outer).to_owned()
}
