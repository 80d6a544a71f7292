//! Special primitives passed through to the backend: vendor instances and
//! memories.

use crate::error::ConstructionError;
use crate::signal::Signal;
use crate::value::{Shape, Value};
use loom_common::bits_for;
use log::warn;
use serde::Serialize;

/// The role of an instance connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PortRole {
    /// A parameter (`p_` key prefix).
    Parameter,
    /// An input port (`i_`).
    Input,
    /// An output port (`o_`).
    Output,
    /// A bidirectional port (`io_`).
    Inout,
}

impl PortRole {
    /// Returns the keyword prefix of this role.
    pub fn prefix(self) -> &'static str {
        match self {
            PortRole::Parameter => "p_",
            PortRole::Input => "i_",
            PortRole::Output => "o_",
            PortRole::Inout => "io_",
        }
    }

    /// Splits a prefixed key such as `i_clk` into its role and port name.
    pub fn parse_key(key: &str) -> Option<(PortRole, &str)> {
        [
            PortRole::Inout,
            PortRole::Parameter,
            PortRole::Input,
            PortRole::Output,
        ]
        .into_iter()
        .find_map(|role| key.strip_prefix(role.prefix()).map(|name| (role, name)))
    }
}

/// One connection of an [`Instance`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstancePort {
    /// What the connection is.
    pub role: PortRole,
    /// Port or parameter name, without prefix.
    pub name: String,
    /// The connected value.
    pub value: Value,
}

/// An opaque primitive instantiated by type name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Instance {
    kind: String,
    ports: Vec<InstancePort>,
}

impl Instance {
    /// Starts an instance of the primitive `kind`.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ports: Vec::new(),
        }
    }

    /// Builds an instance from prefixed keyword connections.
    ///
    /// Keys must start with `p_`, `i_`, `o_` or `io_`.
    pub fn from_keys<I, K, V>(kind: impl Into<String>, connections: I) -> Result<Self, ConstructionError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut inst = Self::new(kind);
        for (key, value) in connections {
            let key = key.as_ref();
            let (role, name) =
                PortRole::parse_key(key).ok_or_else(|| ConstructionError::InstancePrefix {
                    key: key.to_string(),
                })?;
            inst = inst.connect(role, name, value.into())?;
        }
        Ok(inst)
    }

    /// Adds a parameter.
    pub fn param(self, name: impl Into<String>, value: impl Into<Value>) -> Result<Self, ConstructionError> {
        self.connect(PortRole::Parameter, name, value.into())
    }

    /// Connects an input port.
    pub fn input(self, name: impl Into<String>, value: impl Into<Value>) -> Result<Self, ConstructionError> {
        self.connect(PortRole::Input, name, value.into())
    }

    /// Connects an output port; the value must be assignable.
    pub fn output(self, name: impl Into<String>, value: impl Into<Value>) -> Result<Self, ConstructionError> {
        self.connect(PortRole::Output, name, value.into())
    }

    /// Connects a bidirectional port; the value must be assignable and
    /// cannot select an array element at runtime.
    pub fn inout(self, name: impl Into<String>, value: impl Into<Value>) -> Result<Self, ConstructionError> {
        self.connect(PortRole::Inout, name, value.into())
    }

    fn connect(
        mut self,
        role: PortRole,
        name: impl Into<String>,
        value: Value,
    ) -> Result<Self, ConstructionError> {
        let name = name.into();
        value.check_complete()?;
        if matches!(role, PortRole::Output | PortRole::Inout) && !value.is_lvalue() {
            return Err(ConstructionError::NotAnLvalue {
                value: value.to_string(),
            });
        }
        if role == PortRole::Inout && value.contains_array_ref() {
            return Err(ConstructionError::InoutArrayRef { port: name });
        }
        self.ports.push(InstancePort { role, name, value });
        Ok(self)
    }

    /// Returns the primitive type name.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Returns the connections in declaration order.
    pub fn ports(&self) -> &[InstancePort] {
        &self.ports
    }

    /// Returns the connections for rewriting by elaboration passes.
    pub fn ports_mut(&mut self) -> &mut Vec<InstancePort> {
        &mut self.ports
    }
}

/// Read-during-write behavior of a memory port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum WriteMode {
    /// Reads return the old contents.
    ReadFirst,
    /// Reads return the data being written (transparent).
    #[default]
    WriteFirst,
    /// Reads keep their previous output while writing.
    NoChange,
}

/// Options for [`Memory::port`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PortConfig {
    /// Whether the port can write.
    pub write_capable: bool,
    /// Whether reads are combinational.
    pub async_read: bool,
    /// Whether the port has a read enable.
    pub has_re: bool,
    /// Bits per write-enable lane; 0 writes the whole word.
    pub we_granularity: u32,
    /// Read-during-write behavior.
    pub mode: WriteMode,
    /// Clocking domain; `None` uses the configured default memory domain.
    pub clock_domain: Option<String>,
}

/// The signals of one memory port.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryPort {
    adr: Signal,
    dat_r: Signal,
    we: Option<Signal>,
    dat_w: Option<Signal>,
    re: Option<Signal>,
    async_read: bool,
    we_granularity: u32,
    mode: WriteMode,
    clock_domain: Option<String>,
}

impl MemoryPort {
    /// Address input.
    pub fn adr(&self) -> &Signal {
        &self.adr
    }

    /// Read data output.
    pub fn dat_r(&self) -> &Signal {
        &self.dat_r
    }

    /// Write enable, one bit per granularity lane.
    pub fn we(&self) -> Option<&Signal> {
        self.we.as_ref()
    }

    /// Write data input.
    pub fn dat_w(&self) -> Option<&Signal> {
        self.dat_w.as_ref()
    }

    /// Read enable.
    pub fn re(&self) -> Option<&Signal> {
        self.re.as_ref()
    }

    /// Whether reads are combinational.
    pub fn async_read(&self) -> bool {
        self.async_read
    }

    /// Bits per write-enable lane; 0 for whole-word writes.
    pub fn we_granularity(&self) -> u32 {
        self.we_granularity
    }

    /// Read-during-write behavior.
    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    /// The clocking domain, once known.
    pub fn clock_domain(&self) -> Option<&str> {
        self.clock_domain.as_deref()
    }

    /// Sets the clocking domain. Used by finalization and domain renaming.
    pub fn set_clock_domain(&mut self, domain: impl Into<String>) {
        self.clock_domain = Some(domain.into());
    }

    /// Returns the port's signals: address, read data, then the optional
    /// write enable, write data and read enable.
    pub fn signals(&self) -> impl Iterator<Item = &Signal> {
        [Some(&self.adr), Some(&self.dat_r)]
            .into_iter()
            .chain([self.we.as_ref(), self.dat_w.as_ref(), self.re.as_ref()])
            .flatten()
    }
}

/// A memory array with its ports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Memory {
    hint: String,
    width: u32,
    depth: usize,
    init: Vec<i128>,
    ports: Vec<MemoryPort>,
}

impl Memory {
    /// Creates an uninitialized memory of `depth` words of `width` bits.
    pub fn new(width: u32, depth: usize) -> Self {
        Self {
            hint: "mem".to_string(),
            width,
            depth,
            init: Vec::new(),
            ports: Vec::new(),
        }
    }

    /// Sets the name hint used for the memory and its port signals.
    pub fn named(mut self, hint: impl Into<String>) -> Self {
        self.hint = hint.into();
        self
    }

    /// Sets the initial contents; missing trailing words are zero.
    pub fn with_init(mut self, init: Vec<i128>) -> Result<Self, ConstructionError> {
        if init.len() > self.depth {
            return Err(self.error(format!(
                "initialization value count exceeds memory depth ({} > {})",
                init.len(),
                self.depth
            )));
        }
        self.init = init;
        Ok(self)
    }

    /// Adds a port and returns a handle to its signals.
    pub fn port(&mut self, config: PortConfig) -> Result<MemoryPort, ConstructionError> {
        let granularity = config.we_granularity;
        if config.write_capable && granularity != 0 {
            if granularity > self.width {
                return Err(self.error(format!(
                    "write granularity {granularity} exceeds the {}-bit word",
                    self.width
                )));
            }
            if self.width % granularity != 0 {
                return Err(self.error(format!(
                    "write granularity {granularity} does not divide the {}-bit word",
                    self.width
                )));
            }
        }
        if config.async_read && config.mode != WriteMode::WriteFirst {
            return Err(self.error(
                "an asynchronous read port must be write-first (transparent)".to_string(),
            ));
        }
        if config.has_re && config.mode == WriteMode::WriteFirst {
            warn!(
                "memory `{}`: a read enable on a write-first port only latches the address; the data still follows writes",
                self.hint
            );
        }

        let name = |suffix: &str| format!("{}_{suffix}", self.hint);
        let adr_width = bits_for(self.depth.saturating_sub(1) as i128, false);
        let adr = Signal::named(name("adr"), adr_width);
        let dat_r = Signal::named(name("dat_r"), self.width);
        let (we, dat_w) = if config.write_capable {
            let lanes = if granularity == 0 {
                1
            } else {
                self.width / granularity
            };
            (
                Some(Signal::named(name("we"), lanes)),
                Some(Signal::named(name("dat_w"), self.width)),
            )
        } else {
            (None, None)
        };
        let re = config.has_re.then(|| {
            Signal::builder()
                .name(name("re"))
                .shape(Shape::unsigned(1))
                .reset(1)
                .build()
        });
        let port = MemoryPort {
            adr,
            dat_r,
            we,
            dat_w,
            re,
            async_read: config.async_read,
            we_granularity: granularity,
            mode: config.mode,
            clock_domain: config.clock_domain,
        };
        self.ports.push(port.clone());
        Ok(port)
    }

    fn error(&self, reason: String) -> ConstructionError {
        ConstructionError::Memory {
            memory: self.hint.clone(),
            reason,
        }
    }

    /// Returns the name hint.
    pub fn hint(&self) -> &str {
        &self.hint
    }

    /// Returns the word width.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the number of words.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Returns the initial contents.
    pub fn init(&self) -> &[i128] {
        &self.init
    }

    /// Returns the ports in creation order.
    pub fn ports(&self) -> &[MemoryPort] {
        &self.ports
    }

    /// Returns the ports for rewriting by elaboration passes.
    pub fn ports_mut(&mut self) -> &mut [MemoryPort] {
        &mut self.ports
    }
}

/// A primitive the core does not interpret.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Special {
    /// A vendor primitive.
    Instance(Instance),
    /// A memory array.
    Memory(Memory),
}

impl Special {
    /// Calls `f` on every signal the special refers to, in declaration order.
    pub fn visit_signals(&self, f: &mut impl FnMut(&Signal)) {
        match self {
            Special::Instance(inst) => {
                for port in inst.ports() {
                    port.value.visit_signals(f);
                }
            }
            Special::Memory(mem) => {
                for port in mem.ports() {
                    port.signals().for_each(&mut *f);
                }
            }
        }
    }

    /// Collects the signals the special drives.
    pub fn lhs_signals(&self, out: &mut Vec<Signal>) {
        match self {
            Special::Instance(inst) => {
                for port in inst.ports() {
                    if matches!(port.role, PortRole::Output | PortRole::Inout) {
                        port.value.lhs_signals(out);
                    }
                }
            }
            Special::Memory(mem) => {
                for port in mem.ports() {
                    if !out.contains(&port.dat_r) {
                        out.push(port.dat_r.clone());
                    }
                }
            }
        }
    }
}

impl From<Instance> for Special {
    fn from(inst: Instance) -> Self {
        Special::Instance(inst)
    }
}

impl From<Memory> for Special {
    fn from(mem: Memory) -> Self {
        Special::Memory(mem)
    }
}
