//! Finite state machines.
//!
//! An [`Fsm`] names its states up front. Each state is encoded by its
//! position in the declaration and the state register is sized for the
//! largest encoding. Bodies are recorded per state and per domain; adding
//! the machine to a module emits one [`Statement::Switch`] on the state
//! register for every domain that has bodies.

use crate::error::ConstructionError;
use crate::module::COMB_DOMAIN;
use crate::signal::Signal;
use crate::stmt::{Case, Pattern, Statement};
use crate::value::Value;
use loom_common::bits_for;

/// Options for building an [`Fsm`].
#[derive(Debug, Clone)]
pub struct FsmBuilder {
    name: String,
    states: Vec<String>,
    reset: Option<String>,
    domain: String,
}

impl FsmBuilder {
    /// Declares the states in encoding order.
    pub fn states<I, S>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.states = states.into_iter().map(Into::into).collect();
        self
    }

    /// Selects the state entered on reset. Defaults to the first state.
    pub fn reset(mut self, state: impl Into<String>) -> Self {
        self.reset = Some(state.into());
        self
    }

    /// Selects the domain clocking the state register. Defaults to `sync`.
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Validates the options and creates the state register.
    pub fn build(self) -> Result<Fsm, ConstructionError> {
        let fail = |reason: String| ConstructionError::Fsm {
            fsm: self.name.clone(),
            reason,
        };
        if self.domain == COMB_DOMAIN {
            return Err(fail(format!(
                "the state register cannot be driven by the `{COMB_DOMAIN}` domain"
            )));
        }
        if self.states.is_empty() {
            return Err(fail("no states were declared".to_string()));
        }
        if let Some(dup) = self
            .states
            .iter()
            .enumerate()
            .find(|(i, s)| self.states[..*i].contains(s))
            .map(|(_, s)| s)
        {
            return Err(fail(format!("state `{dup}` is declared twice")));
        }
        let reset = match &self.reset {
            Some(name) => self
                .states
                .iter()
                .position(|s| s == name)
                .ok_or_else(|| fail(format!("reset state `{name}` is not declared")))?,
            None => 0,
        };

        let width = bits_for(self.states.len() as i128 - 1, false);
        let state = Signal::builder()
            .name(format!("{}_state", self.name))
            .width(width)
            .reset(reset as i128)
            .build();
        Ok(Fsm {
            name: self.name,
            domain: self.domain,
            state,
            states: self.states,
            bodies: Vec::new(),
        })
    }
}

/// A state machine under construction.
#[derive(Debug, Clone)]
pub struct Fsm {
    name: String,
    domain: String,
    state: Signal,
    states: Vec<String>,
    bodies: Vec<(String, Vec<(usize, Vec<Statement>)>)>,
}

impl Fsm {
    /// Starts describing a machine whose register is named `<name>_state`.
    pub fn builder(name: impl Into<String>) -> FsmBuilder {
        FsmBuilder {
            name: name.into(),
            states: Vec::new(),
            reset: None,
            domain: "sync".to_string(),
        }
    }

    /// A machine over `states` in the `sync` domain, reset into the first.
    pub fn new<I, S>(name: impl Into<String>, states: I) -> Result<Self, ConstructionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::builder(name).states(states).build()
    }

    /// Returns the machine's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the domain clocking the state register.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Returns the state register.
    pub fn state(&self) -> &Signal {
        &self.state
    }

    /// Returns the encoding of `state`.
    pub fn encoding(&self, state: &str) -> Result<usize, ConstructionError> {
        self.states
            .iter()
            .position(|s| s == state)
            .ok_or_else(|| ConstructionError::Fsm {
                fsm: self.name.clone(),
                reason: format!("state `{state}` is not declared"),
            })
    }

    /// A 1-bit value that is set while the machine is in `state`.
    pub fn ongoing(&self, state: &str) -> Result<Value, ConstructionError> {
        let code = self.encoding(state)?;
        Ok(self.state.value().equals(Value::int(code as i128)))
    }

    /// The assignment moving the machine to `state` on the next clock
    /// edge. Belongs in a body of the machine's own domain.
    pub fn next(&self, state: &str) -> Result<Statement, ConstructionError> {
        let code = self.encoding(state)?;
        Statement::assign(&self.state, Value::int(code as i128))
    }

    /// Appends statements executed in `domain` while in `state`.
    pub fn on(
        &mut self,
        state: &str,
        domain: &str,
        statements: impl IntoIterator<Item = Statement>,
    ) -> Result<(), ConstructionError> {
        let code = self.encoding(state)?;
        let pos = match self.bodies.iter().position(|(d, _)| d == domain) {
            Some(pos) => pos,
            None => {
                self.bodies.push((domain.to_string(), Vec::new()));
                self.bodies.len() - 1
            }
        };
        let per_state = &mut self.bodies[pos].1;
        match per_state.iter_mut().find(|(c, _)| *c == code) {
            Some((_, body)) => body.extend(statements),
            None => per_state.push((code, statements.into_iter().collect())),
        }
        Ok(())
    }

    /// Appends combinational statements active while in `state`.
    pub fn comb(
        &mut self,
        state: &str,
        statements: impl IntoIterator<Item = Statement>,
    ) -> Result<(), ConstructionError> {
        self.on(state, COMB_DOMAIN, statements)
    }

    /// Appends statements clocked by the machine's domain while in `state`.
    pub fn sync(
        &mut self,
        state: &str,
        statements: impl IntoIterator<Item = Statement>,
    ) -> Result<(), ConstructionError> {
        let domain = self.domain.clone();
        self.on(state, &domain, statements)
    }

    /// Lowers the machine into one switch per domain, in the order the
    /// domains were first given bodies.
    pub fn into_statements(self) -> Result<Vec<(String, Statement)>, ConstructionError> {
        let selector = self.state.value();
        self.bodies
            .into_iter()
            .map(|(domain, per_state)| {
                let cases = per_state
                    .into_iter()
                    .map(|(code, body)| Case::new([Pattern::int(code as u128)], body));
                Ok((domain, Statement::switch(selector.clone(), cases)?))
            })
            .collect()
    }
}
