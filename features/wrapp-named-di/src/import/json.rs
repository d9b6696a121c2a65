use std::path::Path;

use futures::{future::BoxFuture, FutureExt};
use serde_json::Value;

use super::{Module, ModuleSource};
use crate::{producer::Export, types::{DynError, Instance}};

/// Reads a JSON object and exports each top-level member as a [Value]
///
/// Members are plain data, so they have to be imported with
/// [RegisterLiterals](super::RegisterLiterals).
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonModuleSource;
impl ModuleSource for JsonModuleSource {
    fn load(&self, path: &Path) -> BoxFuture<'static, Result<Module, DynError>> {
        let path = path.to_path_buf();
        async move {
            let text = std::fs::read_to_string(&path)?;
            let Value::Object(members) = serde_json::from_str::<Value>(&text)? else {
                return Err::<_, DynError>("expected an object at the top level".into());
            };

            let exports = members
                .into_iter()
                .map(|(key, value)| (key, Export::Value(Instance::new(value))))
                .collect();
            Ok(Module { path, exports })
        }
        .boxed()
    }
}
