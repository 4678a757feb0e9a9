//! Late-binding COM adapter for `Inventor.Application`.
//!
//! Member names resolve at call time through `IDispatch`, so this module is
//! the only place a renamed member or wrong type can surface; everything is
//! funneled into [`EngineFault`] at this boundary. It is also the only module
//! in the crate containing `unsafe`.

use std::path::Path;

use windows::Win32::System::Com::{
    CLSCTX_LOCAL_SERVER, CLSIDFromProgID, CoCreateInstance, CoInitializeEx,
    COINIT_APARTMENTTHREADED, DISPATCH_FLAGS, DISPATCH_METHOD, DISPATCH_PROPERTYGET,
    DISPATCH_PROPERTYPUT, DISPPARAMS, IDispatch,
};
use windows::Win32::System::Ole::{DISPID_PROPERTYPUT, GetActiveObject};
use windows::core::{BSTR, GUID, Interface, PCWSTR, VARIANT};

use super::{AutomationEngine, EngineDocument, EngineFault, EngineProvider, PropertySet};

const LOCALE_USER_DEFAULT: u32 = 0x0400;
const DEFAULT_PROG_ID: &str = "Inventor.Application";

fn fault(context: &str, err: impl std::fmt::Display) -> EngineFault {
    EngineFault::new(format!("{context}: {err}"))
}

/// Thin wrapper adding name-based member access over a dispatch pointer.
#[derive(Clone)]
struct Dispatch(IDispatch);

impl Dispatch {
    fn member_id(&self, name: &str) -> Result<i32, EngineFault> {
        let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
        let names = [PCWSTR(wide.as_ptr())];
        let mut dispid = 0i32;
        unsafe {
            self.0
                .GetIDsOfNames(
                    &GUID::zeroed(),
                    names.as_ptr(),
                    1,
                    LOCALE_USER_DEFAULT,
                    &mut dispid,
                )
                .map_err(|err| fault(&format!("member '{name}' not found"), err))?;
        }
        Ok(dispid)
    }

    fn invoke(
        &self,
        name: &str,
        flags: DISPATCH_FLAGS,
        args: &mut [VARIANT],
    ) -> Result<VARIANT, EngineFault> {
        let dispid = self.member_id(name)?;

        // IDispatch expects arguments in reverse order.
        args.reverse();
        let mut named_put = DISPID_PROPERTYPUT;
        let mut params = DISPPARAMS {
            rgvarg: args.as_mut_ptr(),
            cArgs: args.len() as u32,
            ..Default::default()
        };
        if flags == DISPATCH_PROPERTYPUT {
            params.rgdispidNamedArgs = &mut named_put;
            params.cNamedArgs = 1;
        }

        let mut result = VARIANT::default();
        unsafe {
            self.0
                .Invoke(
                    dispid,
                    &GUID::zeroed(),
                    LOCALE_USER_DEFAULT,
                    flags,
                    &params,
                    Some(&mut result),
                    None,
                    None,
                )
                .map_err(|err| fault(&format!("invocation of '{name}' failed"), err))?;
        }
        Ok(result)
    }

    fn get(&self, name: &str) -> Result<VARIANT, EngineFault> {
        self.invoke(name, DISPATCH_PROPERTYGET, &mut [])
    }

    fn put(&self, name: &str, value: VARIANT) -> Result<(), EngineFault> {
        self.invoke(name, DISPATCH_PROPERTYPUT, &mut [value])?;
        Ok(())
    }

    fn call(&self, name: &str, args: &mut [VARIANT]) -> Result<VARIANT, EngineFault> {
        self.invoke(name, DISPATCH_METHOD, args)
    }

    fn get_dispatch(&self, name: &str) -> Result<Dispatch, EngineFault> {
        let value = self.get(name)?;
        dispatch_from(&value, name)
    }

    fn get_string(&self, name: &str) -> Result<String, EngineFault> {
        let value = self.get(name)?;
        BSTR::try_from(&value)
            .map(|bstr| bstr.to_string())
            .map_err(|err| fault(&format!("'{name}' is not a string"), err))
    }

    fn get_i32(&self, name: &str) -> Result<i32, EngineFault> {
        let value = self.get(name)?;
        i32::try_from(&value).map_err(|err| fault(&format!("'{name}' is not an integer"), err))
    }

    /// One-based indexed access, the collection convention of the engine.
    fn item(&self, index: i32) -> Result<Dispatch, EngineFault> {
        let value = self.call("Item", &mut [VARIANT::from(index)])?;
        dispatch_from(&value, "Item")
    }
}

fn dispatch_from(value: &VARIANT, context: &str) -> Result<Dispatch, EngineFault> {
    IDispatch::try_from(value)
        .map(Dispatch)
        .map_err(|err| fault(&format!("'{context}' is not an object"), err))
}

fn ensure_com_initialized() -> Result<(), EngineFault> {
    // Per-thread; RPC_E_CHANGED_MODE means someone already initialized with
    // a different model, which is fine for our synchronous calls.
    let hr = unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED) };
    if hr.is_err() && hr != windows::Win32::Foundation::RPC_E_CHANGED_MODE {
        return Err(EngineFault::new(format!("CoInitializeEx failed: {hr}")));
    }
    Ok(())
}

/// Provider that attaches to or spawns the registered COM application.
pub struct ComEngineProvider {
    prog_id: String,
}

impl Default for ComEngineProvider {
    fn default() -> Self {
        Self::new(DEFAULT_PROG_ID)
    }
}

impl ComEngineProvider {
    pub fn new(prog_id: impl Into<String>) -> Self {
        Self {
            prog_id: prog_id.into(),
        }
    }

    fn class_id(&self) -> Result<GUID, EngineFault> {
        let wide: Vec<u16> = self.prog_id.encode_utf16().chain(std::iter::once(0)).collect();
        unsafe { CLSIDFromProgID(PCWSTR(wide.as_ptr())) }
            .map_err(|err| fault(&format!("ProgID '{}' not registered", self.prog_id), err))
    }
}

impl EngineProvider for ComEngineProvider {
    type Engine = ComEngine;

    fn attach_existing(&self) -> Result<ComEngine, EngineFault> {
        ensure_com_initialized()?;
        let clsid = self.class_id()?;
        let mut unknown: Option<windows::core::IUnknown> = None;
        unsafe {
            GetActiveObject(&clsid, None, &mut unknown)
                .map_err(|err| fault("no running instance", err))?;
        }
        let unknown = unknown.ok_or_else(|| EngineFault::new("no running instance"))?;
        let app = unknown
            .cast::<IDispatch>()
            .map_err(|err| fault("running instance is not automatable", err))?;
        Ok(ComEngine {
            app: Dispatch(app),
        })
    }

    fn create_hidden(&self) -> Result<ComEngine, EngineFault> {
        ensure_com_initialized()?;
        let clsid = self.class_id()?;
        let app: IDispatch = unsafe {
            CoCreateInstance(&clsid, None, CLSCTX_LOCAL_SERVER)
                .map_err(|err| fault("application could not be started", err))?
        };
        let engine = ComEngine {
            app: Dispatch(app),
        };
        engine.app.put("Visible", VARIANT::from(false))?;
        Ok(engine)
    }
}

pub struct ComEngine {
    app: Dispatch,
}

// The workflow drives the engine synchronously from the calling thread and
// never overlaps dispose with in-flight writes; cross-apartment marshalling
// is the caller's responsibility, as with the raw automation interface.
unsafe impl Send for ComEngine {}
unsafe impl Sync for ComEngine {}

impl AutomationEngine for ComEngine {
    type Document = ComDocument;

    fn open(&self, path: &Path, activate: bool) -> Result<ComDocument, EngineFault> {
        let documents = self.app.get_dispatch("Documents")?;
        let full_path = BSTR::from(path.to_string_lossy().as_ref());
        let opened = documents.call(
            "Open",
            &mut [VARIANT::from(full_path), VARIANT::from(activate)],
        )?;
        Ok(ComDocument {
            document: dispatch_from(&opened, "Open")?,
        })
    }

    fn quit(&self) -> Result<(), EngineFault> {
        self.app.call("Quit", &mut [])?;
        Ok(())
    }
}

pub struct ComDocument {
    document: Dispatch,
}

impl EngineDocument for ComDocument {
    type Properties = ComPropertySet;

    fn property_sets(&self) -> Result<Vec<ComPropertySet>, EngineFault> {
        let sets = self.document.get_dispatch("PropertySets")?;
        let count = sets.get_i32("Count")?;
        (1..=count)
            .map(|index| Ok(ComPropertySet { set: sets.item(index)? }))
            .collect()
    }

    fn save(&self) -> Result<(), EngineFault> {
        self.document.call("Save", &mut [])?;
        Ok(())
    }

    fn close(self, discard_changes: bool) -> Result<(), EngineFault> {
        self.document
            .call("Close", &mut [VARIANT::from(discard_changes)])?;
        Ok(())
    }
}

pub struct ComPropertySet {
    set: Dispatch,
}

impl PropertySet for ComPropertySet {
    fn name(&self) -> Result<String, EngineFault> {
        self.set.get_string("Name")
    }

    fn entry_names(&self) -> Result<Vec<String>, EngineFault> {
        let count = self.set.get_i32("Count")?;
        (1..=count)
            .map(|index| self.set.item(index)?.get_string("Name"))
            .collect()
    }

    fn set_value(&self, name: &str, value: &str) -> Result<(), EngineFault> {
        let entry = self
            .set
            .call("Item", &mut [VARIANT::from(BSTR::from(name))])?;
        dispatch_from(&entry, "Item")?.put("Value", VARIANT::from(BSTR::from(value)))
    }

    fn add(&self, value: &str, name: &str) -> Result<(), EngineFault> {
        self.set.call(
            "Add",
            &mut [
                VARIANT::from(BSTR::from(value)),
                VARIANT::from(BSTR::from(name)),
            ],
        )?;
        Ok(())
    }
}
