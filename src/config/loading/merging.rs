use toml::{Value, map::Map};

/// Merges imported values in order, then the main value over them
pub fn merge_toml_configs(imports: Vec<Value>, main: Value) -> Value {
    let accumulated = imports
        .into_iter()
        .fold(Value::Table(Map::new()), merge_two_toml_configs);

    merge_two_toml_configs(accumulated, main)
}

/// Deep merge where tables combine key by key and any other overlay value
/// replaces the base outright
pub fn merge_two_toml_configs(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Table(base_table), Value::Table(mut merged_table)) => {
            for (key, base_value) in base_table {
                let merged_value = match merged_table.remove(&key) {
                    Some(overlay_value) => merge_two_toml_configs(base_value, overlay_value),
                    None => base_value,
                };
                merged_table.insert(key, merged_value);
            }
            Value::Table(merged_table)
        }
        (_, overlay) => overlay,
    }
}
