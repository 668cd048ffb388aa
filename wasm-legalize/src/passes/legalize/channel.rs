///
/// High-Word Channel
///
/// A 64-bit return value cannot cross the host boundary in one piece: the
/// low word is returned, the high word is parked in a shared 32-bit cell
/// (`tempRet0`) that the other side reads right after the call. Access to the
/// cell goes through a getter/setter pair, or straight to the global when the
/// module owns it.
///
/// Resolution order:
/// 1. `env.getTempRet0` and `env.setTempRet0` both imported: call through them
/// 2. `getTempRet0` and `setTempRet0` both exported: use the export targets,
///    and the `tempRet0` global directly if the module has one that is a
///    mutable i32 (any other global of that name is ignored and the
///    helpers are called instead)
/// 3. neither: create the global plus getter/setter and export the pair,
///    reusing any of them left by an earlier run
///
/// Finding only one half of a pair in step 1 or 2 is fatal: the getter would
/// not observe the setter's writes. The check happens before the module is
/// touched.
///

use tracing::debug;

use crate::ir::{Builder, Export, Expression, Function, Global, Literal, Module, Name, Signature, ValType};
use crate::passes::{ChannelSource, PassError};

pub const ENV: &str = "env";
pub const TEMP_RET_0: &str = "tempRet0";
pub const GET_TEMP_RET_0: &str = "getTempRet0";
pub const SET_TEMP_RET_0: &str = "setTempRet0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrigin {
    Imported,
    Exported,
    Created,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighWordChannel {
    pub getter: Name,
    pub setter: Name,
    /// Backing global, when stubs may access it without a call.
    pub register: Option<Name>,
    pub origin: ChannelOrigin,
}

impl HighWordChannel {
    pub fn resolve(module: &mut Module) -> Result<Self, PassError> {
        let imported_get = module.imported_function(ENV, GET_TEMP_RET_0).map(|f| f.name.clone());
        let imported_set = module.imported_function(ENV, SET_TEMP_RET_0).map(|f| f.name.clone());
        if let Some((getter, setter)) = complete_pair(imported_get, imported_set, ChannelSource::Imported)? {
            debug!(%getter, %setter, "using imported tempRet0 helpers");
            return Ok(Self {
                getter,
                setter,
                register: None,
                origin: ChannelOrigin::Imported,
            });
        }

        let exported_get = module.function_export(GET_TEMP_RET_0).map(|e| e.value.clone());
        let exported_set = module.function_export(SET_TEMP_RET_0).map(|e| e.value.clone());
        if let Some((getter, setter)) = complete_pair(exported_get, exported_set, ChannelSource::Exported)? {
            let register = module
                .global(TEMP_RET_0)
                .filter(|g| is_channel_register(g))
                .map(|g| g.name.clone());
            debug!(%getter, %setter, direct = register.is_some(), "using exported tempRet0 helpers");
            return Ok(Self {
                getter,
                setter,
                register,
                origin: ChannelOrigin::Exported,
            });
        }

        Self::create(module)
    }

    /// Every name is picked before anything is inserted, so a clash with an
    /// unrelated entity (even a global export named `getTempRet0`) moves the
    /// new entity to a suffixed name instead of failing halfway.
    fn create(module: &mut Module) -> Result<Self, PassError> {
        let register = module.locate_global(&Name::new(TEMP_RET_0), is_channel_register);
        let getter_fn = Function::defined(
            GET_TEMP_RET_0,
            getter_sig(),
            vec![],
            Builder::global_get(register.name.clone(), ValType::I32),
        );
        let setter_fn = Function::defined(
            SET_TEMP_RET_0,
            setter_sig(),
            vec![],
            Builder::global_set(register.name.clone(), Builder::local_get(0, ValType::I32)),
        );
        let getter = module.locate_function(&Name::new(GET_TEMP_RET_0), &getter_fn);
        let setter = module.locate_function(&Name::new(SET_TEMP_RET_0), &setter_fn);
        let get_export = module.locate_function_export(&Name::new(GET_TEMP_RET_0), &getter.name);
        let set_export = module.locate_function_export(&Name::new(SET_TEMP_RET_0), &setter.name);

        if register.created {
            module.add_global(Global {
                name: register.name.clone(),
                ty: ValType::I32,
                mutable: true,
                init: Literal::zero(ValType::I32),
            })?;
        }
        for (slot, mut func) in [(&getter, getter_fn), (&setter, setter_fn)] {
            if slot.created {
                func.name = slot.name.clone();
                module.add_function(func)?;
            }
        }
        for (slot, target) in [(&get_export, &getter.name), (&set_export, &setter.name)] {
            if slot.created {
                module.add_export(Export::function(slot.name.clone(), target.clone()))?;
            }
        }

        let created = [&register, &getter, &setter, &get_export, &set_export]
            .iter()
            .any(|slot| slot.created);
        debug!(
            register = %register.name,
            getter = %getter.name,
            setter = %setter.name,
            created,
            "created tempRet0 helpers"
        );

        Ok(Self {
            getter: getter.name,
            setter: setter.name,
            register: Some(register.name),
            origin: if created { ChannelOrigin::Created } else { ChannelOrigin::Exported },
        })
    }

    /// Reads the parked high word.
    pub fn read_high(&self) -> Expression {
        match &self.register {
            Some(register) => Builder::global_get(register.clone(), ValType::I32),
            None => Builder::call(self.getter.clone(), vec![], Some(ValType::I32)),
        }
    }

    /// Parks `value` as the high word.
    pub fn write_high(&self, value: Expression) -> Expression {
        match &self.register {
            Some(register) => Builder::global_set(register.clone(), value),
            None => Builder::call(self.setter.clone(), vec![value], None),
        }
    }
}

fn getter_sig() -> Signature {
    Signature::new([], Some(ValType::I32))
}

fn setter_sig() -> Signature {
    Signature::new([ValType::I32], None)
}

fn is_channel_register(global: &Global) -> bool {
    global.ty == ValType::I32 && global.mutable
}

fn complete_pair(
    getter: Option<Name>,
    setter: Option<Name>,
    via: ChannelSource,
) -> Result<Option<(Name, Name)>, PassError> {
    match (getter, setter) {
        (Some(getter), Some(setter)) => Ok(Some((getter, setter))),
        (Some(_), None) => Err(PassError::InconsistentChannel {
            present: Name::new(GET_TEMP_RET_0),
            missing: Name::new(SET_TEMP_RET_0),
            via,
        }),
        (None, Some(_)) => Err(PassError::InconsistentChannel {
            present: Name::new(SET_TEMP_RET_0),
            missing: Name::new(GET_TEMP_RET_0),
            via,
        }),
        (None, None) => Ok(None),
    }
}
