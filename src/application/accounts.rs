use crate::domain::ids::AgentId;
use std::collections::{HashMap, HashSet};

/// Bidirectional index of which agents hold accounts at which banks.
#[derive(Debug, Default, Clone)]
pub struct AccountRegistry {
    depositors_by_bank: HashMap<AgentId, HashSet<AgentId>>,
    banks_by_agent: HashMap<AgentId, HashSet<AgentId>>,
}

impl AccountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_account(&mut self, bank: AgentId, agent: AgentId) {
        self.depositors_by_bank
            .entry(bank)
            .or_default()
            .insert(agent);
        self.banks_by_agent.entry(agent).or_default().insert(bank);
    }

    pub fn deregister_account(&mut self, bank: AgentId, agent: AgentId) {
        if let Some(depositors) = self.depositors_by_bank.get_mut(&bank) {
            depositors.remove(&agent);
            if depositors.is_empty() {
                self.depositors_by_bank.remove(&bank);
            }
        }
        if let Some(banks) = self.banks_by_agent.get_mut(&agent) {
            banks.remove(&bank);
            if banks.is_empty() {
                self.banks_by_agent.remove(&agent);
            }
        }
    }

    /// Drops every account the agent holds. Returns the banks it banked with.
    pub fn remove_agent_from_all_accounts(&mut self, agent: AgentId) -> Vec<AgentId> {
        let mut banks: Vec<AgentId> = self
            .banks_by_agent
            .remove(&agent)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();
        banks.sort();
        for bank in &banks {
            if let Some(depositors) = self.depositors_by_bank.get_mut(bank) {
                depositors.remove(&agent);
                if depositors.is_empty() {
                    self.depositors_by_bank.remove(bank);
                }
            }
        }
        banks
    }

    pub fn get_depositors(&self, bank: AgentId) -> Option<&HashSet<AgentId>> {
        self.depositors_by_bank.get(&bank)
    }

    pub fn get_banks(&self, agent: AgentId) -> Option<&HashSet<AgentId>> {
        self.banks_by_agent.get(&agent)
    }

    pub fn has_account(&self, bank: AgentId, agent: AgentId) -> bool {
        self.banks_by_agent
            .get(&agent)
            .is_some_and(|banks| banks.contains(&bank))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_visible_both_ways() {
        let mut registry = AccountRegistry::new();
        registry.register_account(AgentId(1), AgentId(10));
        registry.register_account(AgentId(1), AgentId(11));

        assert_eq!(registry.get_depositors(AgentId(1)).unwrap().len(), 2);
        assert!(registry.get_banks(AgentId(10)).unwrap().contains(&AgentId(1)));
        assert!(registry.has_account(AgentId(1), AgentId(11)));
    }

    #[test]
    fn test_deregister_cleans_empty_sets() {
        let mut registry = AccountRegistry::new();
        registry.register_account(AgentId(1), AgentId(10));
        registry.deregister_account(AgentId(1), AgentId(10));

        assert!(registry.get_depositors(AgentId(1)).is_none());
        assert!(registry.get_banks(AgentId(10)).is_none());
    }

    #[test]
    fn test_remove_agent_from_all_accounts() {
        let mut registry = AccountRegistry::new();
        registry.register_account(AgentId(1), AgentId(10));
        registry.register_account(AgentId(2), AgentId(10));
        registry.register_account(AgentId(2), AgentId(11));

        let banks = registry.remove_agent_from_all_accounts(AgentId(10));
        assert_eq!(banks, vec![AgentId(1), AgentId(2)]);
        assert!(registry.get_banks(AgentId(10)).is_none());
        assert!(registry.get_depositors(AgentId(1)).is_none());
        assert_eq!(registry.get_depositors(AgentId(2)).unwrap().len(), 1);
    }
}
