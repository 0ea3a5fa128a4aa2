//! VM registry: listing, lookup, creation and deletion.
//!
//! UTM's scripting bridge returns a single string per script, so listings are
//! flattened into delimited text:
//!
//! ```text
//! id|#|name|#|backend|#|status|&|id|#|name|#|backend|#|status|&|
//! ```

use crate::client::UtmClient;
use crate::config::{DriveSource, QemuConfiguration};
use crate::error::{Result, VmError, VmSelector};
use crate::machine::{VirtualMachine, Vm, VmBackend, VmStatus};
use crate::record::{quote, to_record_string};

/// Separates fields within one VM record.
pub const FIELD_SEPARATOR: &str = "|#|";

/// Separates VM records in a listing.
pub const RECORD_SEPARATOR: &str = "|&|";

/// Script expression serializing `vm` as one record.
const VM_RECORD_EXPR: &str =
    r#"id of vm & "|#|" & name of vm & "|#|" & backend of vm & "|#|" & status of vm"#;

/// Parse one `id|#|name|#|backend|#|status` record.
///
/// Returns `None` unless the record has exactly four fields.
pub fn parse_vm_record(record: &str) -> Option<Vm> {
    let fields: Vec<&str> = record.split(FIELD_SEPARATOR).collect();
    let [id, name, backend, status] = fields.as_slice() else {
        return None;
    };
    Some(Vm {
        id: id.to_string(),
        name: name.to_string(),
        backend: VmBackend::from(*backend),
        status: VmStatus::from(*status),
    })
}

/// Parse a VM listing. Malformed records are skipped.
pub fn parse_vm_list(output: &str) -> Vec<Vm> {
    let output = output.strip_suffix(RECORD_SEPARATOR).unwrap_or(output);
    if output.is_empty() {
        return Vec::new();
    }
    output
        .split(RECORD_SEPARATOR)
        .filter_map(|record| {
            let vm = parse_vm_record(record);
            if vm.is_none() {
                tracing::trace!(record, "Skipping malformed VM record");
            }
            vm
        })
        .collect()
}

impl UtmClient {
    /// List every VM UTM knows about, in UTM's order.
    pub async fn list_vms(&self) -> Result<Vec<Vm>> {
        let output = self
            .tell(vec![
                "set vms to virtual machines".into(),
                r#"set output to """#.into(),
                "repeat with vm in vms".into(),
                format!("\tset output to output & {VM_RECORD_EXPR} & \"{RECORD_SEPARATOR}\""),
                "end repeat".into(),
                "return output".into(),
            ])
            .await?;

        let vms = parse_vm_list(&output);
        tracing::debug!(count = vms.len(), "Listed VMs");
        Ok(vms)
    }

    /// Find a VM by its UTM identifier.
    pub async fn vm_by_id(&self, id: &str) -> Result<VirtualMachine> {
        self.find(VmSelector::Id(id.to_string()), |vm| vm.id == id)
            .await
    }

    /// Find a VM by display name.
    pub async fn vm_by_name(&self, name: &str) -> Result<VirtualMachine> {
        self.find(VmSelector::Name(name.to_string()), |vm| vm.name == name)
            .await
    }

    async fn find(
        &self,
        selector: VmSelector,
        predicate: impl Fn(&Vm) -> bool,
    ) -> Result<VirtualMachine> {
        self.list_vms()
            .await?
            .into_iter()
            .find(|vm| predicate(vm))
            .map(|vm| self.machine(vm))
            .ok_or(VmError::NotFound(selector))
    }

    /// Create a QEMU virtual machine.
    ///
    /// Drives whose source is a host path are bound to script variables
    /// (`drive0`, `drive1`, ... by drive index) before the configuration is
    /// encoded.
    pub async fn create_qemu_vm(&self, config: &QemuConfiguration) -> Result<VirtualMachine> {
        tracing::info!(name = %config.name, drives = config.drives.len(), "Creating QEMU VM");

        let mut config = config.clone();
        let mut script = Vec::new();
        for (index, drive) in config.drives.iter_mut().enumerate() {
            let path = match &drive.source {
                DriveSource::Path(path) => path.to_string_lossy().into_owned(),
                _ => continue,
            };
            let variable = format!("drive{index}");
            script.push(format!("set {variable} to POSIX file {}", quote(&path)));
            drive.source = DriveSource::Variable(variable);
        }

        let record = to_record_string(&config)?;
        tracing::trace!(configuration = %record, "Encoded VM configuration");

        script.push(format!(
            "set vm to make new virtual machine with properties {{backend: qemu, configuration: {record}}}"
        ));
        script.push(format!("return {VM_RECORD_EXPR}"));

        let output = self.tell(script).await?;
        let vm = parse_vm_record(&output).ok_or_else(|| VmError::Parse {
            context: "make new virtual machine",
            response: output.clone(),
        })?;

        tracing::info!(vm_id = %vm.id, name = %vm.name, "QEMU VM created");
        Ok(self.machine(vm))
    }

    /// Delete a VM by identifier.
    pub async fn delete_vm_by_id(&self, id: &str) -> Result<()> {
        tracing::info!(vm_id = %id, "Deleting VM");
        self.tell(vec![format!("delete virtual machine id {}", quote(id))])
            .await
            .map(drop)
            .map_err(|e| VmError::command(id, "delete", e))
    }

    /// Delete a VM by display name.
    pub async fn delete_vm_by_name(&self, name: &str) -> Result<()> {
        tracing::info!(name = %name, "Deleting VM by name");
        self.tell(vec![format!("delete virtual machine named {}", quote(name))])
            .await
            .map(drop)
            .map_err(|e| VmError::command(name, "delete by name", e))
    }
}
