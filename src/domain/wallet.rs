use super::ids::AgentId;
use super::money::{Currency, Money};
use crate::error::{KernelError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-owner multi-currency balance store.
///
/// Balances can never go negative: `subtract` refuses and leaves the wallet
/// untouched instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub owner: AgentId,
    balances: BTreeMap<Currency, Money>,
}

impl Wallet {
    pub fn new(owner: AgentId) -> Self {
        Self {
            owner,
            balances: BTreeMap::new(),
        }
    }

    /// Credits funds. Refuses a credit the balance cannot represent and
    /// leaves the wallet untouched.
    pub fn add(&mut self, amount: Money, currency: Currency) -> Result<()> {
        let balance = self.get_balance(currency);
        let credited = balance
            .checked_add(amount)
            .ok_or(KernelError::BalanceOverflow {
                agent: self.owner,
                currency,
                amount,
            })?;
        self.balances.insert(currency, credited);
        Ok(())
    }

    /// Debits funds if sufficient.
    pub fn subtract(&mut self, amount: Money, currency: Currency) -> Result<()> {
        let available = self.get_balance(currency);
        match available.checked_sub(amount) {
            Some(remaining) => {
                self.balances.insert(currency, remaining);
                Ok(())
            }
            None => Err(KernelError::InsufficientFunds {
                agent: self.owner,
                currency,
                required: amount,
                available,
            }),
        }
    }

    pub fn get_balance(&self, currency: Currency) -> Money {
        self.balances.get(&currency).copied().unwrap_or_default()
    }

    pub fn get_all_balances(&self) -> &BTreeMap<Currency, Money> {
        &self.balances
    }

    /// Empties the wallet, returning what it held.
    pub(crate) fn drain(&mut self) -> BTreeMap<Currency, Money> {
        std::mem::take(&mut self.balances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_add() {
        let mut wallet = Wallet::new(AgentId(1));
        wallet.add(Money(500), Currency::Usd).unwrap();
        wallet.add(Money(250), Currency::Usd).unwrap();
        assert_eq!(wallet.get_balance(Currency::Usd), Money(750));
        assert_eq!(wallet.get_balance(Currency::Eur), Money::ZERO);
    }

    #[test]
    fn test_wallet_subtract_success() {
        let mut wallet = Wallet::new(AgentId(1));
        wallet.add(Money(500), Currency::Usd).unwrap();
        wallet.subtract(Money(500), Currency::Usd).unwrap();
        assert_eq!(wallet.get_balance(Currency::Usd), Money::ZERO);
    }

    #[test]
    fn test_wallet_subtract_insufficient_leaves_balance() {
        let mut wallet = Wallet::new(AgentId(1));
        wallet.add(Money(100), Currency::Usd).unwrap();

        let result = wallet.subtract(Money(101), Currency::Usd);
        assert!(matches!(
            result,
            Err(KernelError::InsufficientFunds {
                required: Money(101),
                available: Money(100),
                ..
            })
        ));
        assert_eq!(wallet.get_balance(Currency::Usd), Money(100));
    }

    #[test]
    fn test_wallet_add_overflow_leaves_balance() {
        let mut wallet = Wallet::new(AgentId(1));
        wallet.add(Money(u64::MAX - 1), Currency::Usd).unwrap();

        let result = wallet.add(Money(2), Currency::Usd);
        assert!(matches!(
            result,
            Err(KernelError::BalanceOverflow {
                amount: Money(2),
                ..
            })
        ));
        assert_eq!(wallet.get_balance(Currency::Usd), Money(u64::MAX - 1));
    }

    #[test]
    fn test_wallet_currencies_are_independent() {
        let mut wallet = Wallet::new(AgentId(3));
        wallet.add(Money(10), Currency::Eur).unwrap();
        assert!(wallet.subtract(Money(1), Currency::Usd).is_err());
        assert_eq!(wallet.get_all_balances().len(), 1);
    }
}
