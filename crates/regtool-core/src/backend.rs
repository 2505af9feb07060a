//! Register backend contract and an in-memory reference backend.
//!
//! The backend is the only path from the conversion and status layers to the
//! device. Everything above it works on register names and parameters; the
//! backend resolves names to addresses and masks and performs the word
//! transfers.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use globset::Glob;

use crate::error::{Access, RegisterError};

/// Case-folding policy applied to register names before every lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum RegisterNameCase {
    /// Names are upper-cased.
    #[default]
    Upper,
    /// Names are lower-cased.
    Lower,
    /// Names are used exactly as given.
    CaseSensitive,
}

impl RegisterNameCase {
    /// Folds `name` according to this policy.
    #[must_use]
    pub fn apply(self, name: &str) -> String {
        match self {
            Self::Upper => name.to_uppercase(),
            Self::Lower => name.to_lowercase(),
            Self::CaseSensitive => name.to_string(),
        }
    }
}

/// Static description of one named register.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RegisterDescriptor {
    /// Register name, unique within a backend.
    pub name: String,
    /// Word address.
    pub address: u32,
    /// Bit mask selecting the register field inside the word.
    pub mask: u32,
    /// Number of consecutive words.
    pub size: u32,
    /// Permission string containing `r` and/or `w`.
    pub permissions: String,
    /// Access mode, for example `single`, `incremental` or `fifo`.
    pub mode: String,
    /// Free-form description.
    pub description: String,
    /// Open parameter map (`Table`, `Row`, `Column`, `Format`, ...).
    pub parameters: BTreeMap<String, String>,
}

impl RegisterDescriptor {
    /// Creates a full-word read/write register with no parameters.
    #[must_use]
    pub fn new(name: impl Into<String>, address: u32) -> Self {
        Self {
            name: name.into(),
            address,
            mask: u32::MAX,
            size: 1,
            permissions: "rw".to_string(),
            mode: "single".to_string(),
            description: String::new(),
            parameters: BTreeMap::new(),
        }
    }

    /// Sets the field mask.
    #[must_use]
    pub const fn with_mask(mut self, mask: u32) -> Self {
        self.mask = mask;
        self
    }

    /// Sets the word count.
    #[must_use]
    pub const fn with_size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    /// Sets the permission string.
    #[must_use]
    pub fn with_permissions(mut self, permissions: impl Into<String>) -> Self {
        self.permissions = permissions.into();
        self
    }

    /// Sets the access mode.
    #[must_use]
    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = mode.into();
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Adds or replaces one parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Returns `true` when the permissions allow reads.
    #[must_use]
    pub fn is_readable(&self) -> bool {
        self.permissions.contains('r')
    }

    /// Returns `true` when the permissions allow writes.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.permissions.contains('w')
    }
}

/// Shift that aligns a masked field to bit 0.
#[must_use]
pub const fn mask_shift(mask: u32) -> u32 {
    if mask == 0 {
        0
    } else {
        mask.trailing_zeros()
    }
}

/// Register access contract consumed by conversion and status reporting.
///
/// Transfers take `&mut self`; metadata lookups take `&self`. Names passed in
/// are folded with [`RegisterBackend::name_case`] by the implementation.
pub trait RegisterBackend {
    /// Reads one raw word.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::BusError`] when the transport fails.
    fn read_word(&mut self, address: u32) -> Result<u32, RegisterError>;

    /// Writes one raw word.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::BusError`] when the transport fails.
    fn write_word(&mut self, address: u32, value: u32) -> Result<(), RegisterError>;

    /// Reads a named register, returning the masked field shifted to bit 0.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::BadRegName`] for unknown names,
    /// [`RegisterError::AccessDenied`] without read permission, and
    /// [`RegisterError::BusError`] on transport failure.
    fn read_name(&mut self, name: &str) -> Result<u32, RegisterError>;

    /// Writes a named register field.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::BadRegName`] for unknown names,
    /// [`RegisterError::AccessDenied`] without write permission,
    /// [`RegisterError::BadValue`] when `value` does not fit the field, and
    /// [`RegisterError::BusError`] on transport failure.
    fn write_name(&mut self, name: &str, value: u32) -> Result<(), RegisterError>;

    /// Returns the word address of a register.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::BadRegName`] for unknown names.
    fn address(&self, name: &str) -> Result<u32, RegisterError>;

    /// Returns the field mask of a register.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::BadRegName`] for unknown names.
    fn mask(&self, name: &str) -> Result<u32, RegisterError>;

    /// Returns the word count of a register.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::BadRegName`] for unknown names.
    fn size(&self, name: &str) -> Result<u32, RegisterError>;

    /// Returns the permission string of a register.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::BadRegName`] for unknown names.
    fn permissions(&self, name: &str) -> Result<String, RegisterError>;

    /// Returns the access mode of a register.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::BadRegName`] for unknown names.
    fn mode(&self, name: &str) -> Result<String, RegisterError>;

    /// Returns the description of a register.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::BadRegName`] for unknown names.
    fn description(&self, name: &str) -> Result<String, RegisterError>;

    /// Looks up one parameter; `Ok(None)` when the register lacks the key.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::BadRegName`] for unknown names.
    fn parameter(&self, name: &str, key: &str) -> Result<Option<String>, RegisterError>;

    /// Returns every parameter key defined on a register.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::BadRegName`] for unknown names.
    fn parameter_names(&self, name: &str) -> Result<Vec<String>, RegisterError>;

    /// Lists register names matching a glob pattern, in backend order.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::BadValue`] for an invalid pattern.
    fn enumerate_names(&self, pattern: &str) -> Result<Vec<String>, RegisterError>;

    /// Returns the active case-folding policy.
    fn name_case(&self) -> RegisterNameCase;

    /// Looks up a parameter that must be present.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::BadValue`] when the key is absent and
    /// [`RegisterError::BadRegName`] for unknown names.
    fn require_parameter(&self, name: &str, key: &str) -> Result<String, RegisterError> {
        self.parameter(name, key)?.ok_or_else(|| {
            RegisterError::bad_value(format!("register {name} has no parameter {key}"))
        })
    }

    /// Lists registers whose parameter `key` equals `value`.
    ///
    /// # Errors
    ///
    /// Propagates enumeration and lookup failures.
    fn find_with_parameter(&self, key: &str, value: &str) -> Result<Vec<String>, RegisterError> {
        let mut found = Vec::new();
        for name in self.enumerate_names("*")? {
            if self.parameter(&name, key)?.as_deref() == Some(value) {
                found.push(name);
            }
        }
        Ok(found)
    }

    /// Reads `count` words from the same address.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first transfer failure.
    fn read_fifo(&mut self, address: u32, count: usize) -> Result<Vec<u32>, RegisterError> {
        (0..count).map(|_| self.read_word(address)).collect()
    }

    /// Writes every value to the same address.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first transfer failure.
    fn write_fifo(&mut self, address: u32, values: &[u32]) -> Result<(), RegisterError> {
        values
            .iter()
            .try_for_each(|value| self.write_word(address, *value))
    }

    /// Reads `count` words from consecutive addresses.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first transfer failure.
    fn read_block(&mut self, address: u32, count: usize) -> Result<Vec<u32>, RegisterError> {
        let mut target = address;
        let mut words = Vec::with_capacity(count);
        for _ in 0..count {
            words.push(self.read_word(target)?);
            target = target.wrapping_add(1);
        }
        Ok(words)
    }

    /// Writes values to consecutive addresses.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first transfer failure.
    fn write_block(&mut self, address: u32, values: &[u32]) -> Result<(), RegisterError> {
        let mut target = address;
        for value in values {
            self.write_word(target, *value)?;
            target = target.wrapping_add(1);
        }
        Ok(())
    }

    /// Reads the raw word at `offset` words past a register's address.
    ///
    /// # Errors
    ///
    /// Propagates name lookup and transfer failures.
    fn read_offset(&mut self, name: &str, offset: u32) -> Result<u32, RegisterError> {
        let address = self.address(name)?;
        self.read_word(address.wrapping_add(offset))
    }

    /// Writes a raw word at `offset` words past a register's address.
    ///
    /// # Errors
    ///
    /// Propagates name lookup and transfer failures.
    fn write_offset(&mut self, name: &str, offset: u32, value: u32) -> Result<(), RegisterError> {
        let address = self.address(name)?;
        self.write_word(address.wrapping_add(offset), value)
    }

    /// Performs an action write by setting every bit of the register field.
    ///
    /// # Errors
    ///
    /// Propagates name lookup and write failures.
    fn write_action(&mut self, name: &str) -> Result<(), RegisterError> {
        let mask = self.mask(name)?;
        self.write_name(name, mask >> mask_shift(mask))
    }
}

/// Register backend over a simulated word-addressed memory.
///
/// Unwritten addresses read as zero. Addresses can be marked faulty to
/// exercise transport failure handling.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    name_case: RegisterNameCase,
    registers: Vec<RegisterDescriptor>,
    index: HashMap<String, usize>,
    words: BTreeMap<u32, u32>,
    faulty: BTreeSet<u32>,
}

impl MemoryBackend {
    /// Creates an empty backend with the given case policy.
    #[must_use]
    pub fn new(name_case: RegisterNameCase) -> Self {
        Self {
            name_case,
            ..Self::default()
        }
    }

    /// Adds a register, folding its name with the case policy.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::BadValue`] when the folded name already exists.
    pub fn insert(&mut self, mut descriptor: RegisterDescriptor) -> Result<(), RegisterError> {
        descriptor.name = self.name_case.apply(&descriptor.name);
        if self.index.contains_key(&descriptor.name) {
            return Err(RegisterError::bad_value(format!(
                "duplicate register name {}",
                descriptor.name
            )));
        }
        self.index
            .insert(descriptor.name.clone(), self.registers.len());
        self.registers.push(descriptor);
        Ok(())
    }

    /// Returns the descriptor for a register name.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::BadRegName`] for unknown names.
    pub fn descriptor(&self, name: &str) -> Result<&RegisterDescriptor, RegisterError> {
        let folded = self.name_case.apply(name);
        self.index
            .get(&folded)
            .map(|slot| &self.registers[*slot])
            .ok_or_else(|| RegisterError::bad_reg_name(folded))
    }

    /// Stores a raw word without fault checks.
    pub fn poke(&mut self, address: u32, value: u32) {
        self.words.insert(address, value);
    }

    /// Returns the stored raw word without fault checks.
    #[must_use]
    pub fn peek(&self, address: u32) -> u32 {
        self.words.get(&address).copied().unwrap_or(0)
    }

    /// Makes every transfer to `address` fail with a bus error.
    pub fn inject_bus_fault(&mut self, address: u32) {
        self.faulty.insert(address);
    }

    /// Removes a fault added by [`MemoryBackend::inject_bus_fault`].
    pub fn clear_bus_fault(&mut self, address: u32) {
        self.faulty.remove(&address);
    }

    fn check_transport(&self, address: u32) -> Result<(), RegisterError> {
        if self.faulty.contains(&address) {
            return Err(RegisterError::BusError {
                target: format!("0x{address:08X}"),
                reason: "transport fault".to_string(),
            });
        }
        Ok(())
    }
}

impl RegisterBackend for MemoryBackend {
    fn read_word(&mut self, address: u32) -> Result<u32, RegisterError> {
        self.check_transport(address)?;
        Ok(self.peek(address))
    }

    fn write_word(&mut self, address: u32, value: u32) -> Result<(), RegisterError> {
        self.check_transport(address)?;
        tracing::trace!(address, value, "word write");
        self.poke(address, value);
        Ok(())
    }

    fn read_name(&mut self, name: &str) -> Result<u32, RegisterError> {
        let descriptor = self.descriptor(name)?;
        if !descriptor.is_readable() {
            return Err(RegisterError::AccessDenied {
                name: descriptor.name.clone(),
                access: Access::Read,
            });
        }
        let (address, mask) = (descriptor.address, descriptor.mask);
        let word = self.read_word(address)?;
        Ok((word & mask) >> mask_shift(mask))
    }

    fn write_name(&mut self, name: &str, value: u32) -> Result<(), RegisterError> {
        let descriptor = self.descriptor(name)?;
        if !descriptor.is_writable() {
            return Err(RegisterError::AccessDenied {
                name: descriptor.name.clone(),
                access: Access::Write,
            });
        }
        let (address, mask) = (descriptor.address, descriptor.mask);
        let field = mask >> mask_shift(mask);
        if value & !field != 0 {
            return Err(RegisterError::bad_value(format!(
                "value 0x{value:X} does not fit register {} (mask 0x{mask:08X})",
                descriptor.name
            )));
        }
        let shifted = value << mask_shift(mask);
        if mask == u32::MAX {
            return self.write_word(address, shifted);
        }
        let old = self.read_word(address)?;
        self.write_word(address, (old & !mask) | (shifted & mask))
    }

    fn address(&self, name: &str) -> Result<u32, RegisterError> {
        Ok(self.descriptor(name)?.address)
    }

    fn mask(&self, name: &str) -> Result<u32, RegisterError> {
        Ok(self.descriptor(name)?.mask)
    }

    fn size(&self, name: &str) -> Result<u32, RegisterError> {
        Ok(self.descriptor(name)?.size)
    }

    fn permissions(&self, name: &str) -> Result<String, RegisterError> {
        Ok(self.descriptor(name)?.permissions.clone())
    }

    fn mode(&self, name: &str) -> Result<String, RegisterError> {
        Ok(self.descriptor(name)?.mode.clone())
    }

    fn description(&self, name: &str) -> Result<String, RegisterError> {
        Ok(self.descriptor(name)?.description.clone())
    }

    fn parameter(&self, name: &str, key: &str) -> Result<Option<String>, RegisterError> {
        Ok(self.descriptor(name)?.parameters.get(key).cloned())
    }

    fn parameter_names(&self, name: &str) -> Result<Vec<String>, RegisterError> {
        Ok(self.descriptor(name)?.parameters.keys().cloned().collect())
    }

    fn enumerate_names(&self, pattern: &str) -> Result<Vec<String>, RegisterError> {
        let folded = self.name_case.apply(pattern);
        let matcher = Glob::new(&folded)
            .map_err(|err| RegisterError::bad_value(format!("invalid pattern {folded}: {err}")))?
            .compile_matcher();
        Ok(self
            .registers
            .iter()
            .filter(|descriptor| matcher.is_match(&descriptor.name))
            .map(|descriptor| descriptor.name.clone())
            .collect())
    }

    fn name_case(&self) -> RegisterNameCase {
        self.name_case
    }
}

#[cfg(test)]
mod tests {
    use super::{MemoryBackend, RegisterBackend, RegisterDescriptor, RegisterNameCase};
    use crate::error::{ErrorKind, RegisterError};

    fn backend() -> MemoryBackend {
        let mut backend = MemoryBackend::new(RegisterNameCase::Upper);
        backend
            .insert(
                RegisterDescriptor::new("ctrl.enable", 0x10)
                    .with_mask(0x0000_00F0)
                    .with_parameter("Format", "u"),
            )
            .unwrap();
        backend
            .insert(RegisterDescriptor::new("CTRL.STATUS", 0x11).with_permissions("r"))
            .unwrap();
        backend
            .insert(RegisterDescriptor::new("CTRL.GO", 0x12).with_permissions("w"))
            .unwrap();
        backend
    }

    #[test]
    fn names_are_folded_on_insert_and_lookup() {
        let backend = backend();
        assert_eq!(backend.address("Ctrl.Enable").unwrap(), 0x10);
        assert_eq!(
            backend.enumerate_names("ctrl.*").unwrap(),
            vec!["CTRL.ENABLE", "CTRL.STATUS", "CTRL.GO"]
        );
    }

    #[test]
    fn case_sensitive_backend_keeps_names() {
        let mut backend = MemoryBackend::new(RegisterNameCase::CaseSensitive);
        backend
            .insert(RegisterDescriptor::new("Mixed.Name", 1))
            .unwrap();
        assert!(backend.address("Mixed.Name").is_ok());
        assert_eq!(
            backend.address("MIXED.NAME").unwrap_err().kind(),
            ErrorKind::BadRegName
        );
    }

    #[test]
    fn masked_reads_and_writes_preserve_neighbour_bits() {
        let mut backend = backend();
        backend.poke(0x10, 0xFFFF_FF0F);
        backend.write_name("CTRL.ENABLE", 0xA).unwrap();
        assert_eq!(backend.peek(0x10), 0xFFFF_FFAF);
        assert_eq!(backend.read_name("CTRL.ENABLE").unwrap(), 0xA);
    }

    #[test]
    fn oversized_field_value_is_rejected() {
        let mut backend = backend();
        let err = backend.write_name("CTRL.ENABLE", 0x10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadValue);
    }

    #[test]
    fn permissions_are_enforced() {
        let mut backend = backend();
        assert_eq!(
            backend.write_name("CTRL.STATUS", 1).unwrap_err().kind(),
            ErrorKind::AccessDenied
        );
        assert_eq!(
            backend.read_name("CTRL.GO").unwrap_err().kind(),
            ErrorKind::AccessDenied
        );
    }

    #[test]
    fn action_write_sets_whole_field() {
        let mut backend = backend();
        backend.write_action("CTRL.ENABLE").unwrap();
        assert_eq!(backend.peek(0x10), 0xF0);
    }

    #[test]
    fn fifo_repeats_address_and_block_increments() {
        let mut backend = backend();
        backend.write_block(0x100, &[1, 2, 3]).unwrap();
        assert_eq!(backend.read_block(0x100, 3).unwrap(), vec![1, 2, 3]);
        assert_eq!(backend.read_fifo(0x101, 2).unwrap(), vec![2, 2]);
        backend.write_fifo(0x200, &[7, 8]).unwrap();
        assert_eq!(backend.peek(0x200), 8);
        assert_eq!(backend.peek(0x201), 0);
    }

    #[test]
    fn offset_access_is_relative_to_register_address() {
        let mut backend = backend();
        backend.write_offset("CTRL.STATUS", 2, 0x55).unwrap();
        assert_eq!(backend.peek(0x13), 0x55);
        assert_eq!(backend.read_offset("CTRL.STATUS", 2).unwrap(), 0x55);
    }

    #[test]
    fn injected_fault_surfaces_as_bus_error() {
        let mut backend = backend();
        backend.inject_bus_fault(0x11);
        let err = backend.read_name("CTRL.STATUS").unwrap_err();
        assert!(matches!(err, RegisterError::BusError { .. }));
        backend.clear_bus_fault(0x11);
        assert_eq!(backend.read_name("CTRL.STATUS").unwrap(), 0);
    }

    #[test]
    fn parameter_lookup_distinguishes_absent_key_from_unknown_register() {
        let backend = backend();
        assert_eq!(
            backend.parameter("CTRL.ENABLE", "Format").unwrap().as_deref(),
            Some("u")
        );
        assert_eq!(backend.parameter("CTRL.ENABLE", "Table").unwrap(), None);
        assert_eq!(
            backend
                .require_parameter("CTRL.ENABLE", "Table")
                .unwrap_err()
                .kind(),
            ErrorKind::BadValue
        );
        assert_eq!(
            backend.parameter("NOPE", "Table").unwrap_err().kind(),
            ErrorKind::BadRegName
        );
        assert_eq!(
            backend.find_with_parameter("Format", "u").unwrap(),
            vec!["CTRL.ENABLE"]
        );
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut backend = backend();
        let err = backend
            .insert(RegisterDescriptor::new("ctrl.go", 0x40))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadValue);
    }
}
