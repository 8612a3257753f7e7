use crate::application::ledger::MonetaryLedger;
use crate::domain::ids::{AgentId, Tick, TransactionId};
use crate::domain::money::{Currency, Money};
use crate::domain::transaction::{SettlementLeg, Transaction, TransactionKind};
use crate::domain::wallet::Wallet;
use crate::error::{KernelError, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};

/// Valued non-cash assets seized alongside cash in a liquidation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssetValuation {
    pub inventory: Money,
    pub capital: Money,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidationRecord {
    pub debtor: AgentId,
    pub creditor: AgentId,
    pub cash_seized: Money,
    pub inventory_value: Money,
    pub capital_value: Money,
    pub tick: Tick,
}

impl LiquidationRecord {
    pub fn total_recovered(&self) -> Money {
        self.cash_seized + self.inventory_value + self.capital_value
    }
}

/// Executes every money movement in the kernel.
///
/// Wallets live here and nowhere else. All operations are all-or-nothing:
/// a refused operation leaves every wallet exactly as it was.
pub struct SettlementSystem {
    wallets: HashMap<AgentId, Wallet>,
    reserve_accounts: HashSet<AgentId>,
    authority: AgentId,
    currency: Currency,
    journal: Vec<Transaction>,
    next_tx_id: u64,
}

impl SettlementSystem {
    /// Creates the settlement system. `currency` is the one used by legs that
    /// do not name a currency; the monetary authority gets a reserve wallet.
    pub fn new(authority: AgentId, currency: Currency) -> Self {
        let mut system = Self {
            wallets: HashMap::new(),
            reserve_accounts: HashSet::new(),
            authority,
            currency,
            journal: Vec::new(),
            next_tx_id: 1,
        };
        system.open_wallet(authority);
        system.mark_reserve_account(authority);
        system
    }

    pub fn authority(&self) -> AgentId {
        self.authority
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Opens an empty wallet. Returns false if the agent already has one.
    pub fn open_wallet(&mut self, agent: AgentId) -> bool {
        if self.wallets.contains_key(&agent) {
            return false;
        }
        self.wallets.insert(agent, Wallet::new(agent));
        true
    }

    /// Flags a wallet as bank or authority reserves, outside money in circulation.
    pub fn mark_reserve_account(&mut self, agent: AgentId) {
        self.reserve_accounts.insert(agent);
    }

    pub fn is_reserve_account(&self, agent: AgentId) -> bool {
        self.reserve_accounts.contains(&agent)
    }

    /// Opening balance, credited before the ledger baseline is taken.
    pub fn endow(&mut self, agent: AgentId, amount: Money, currency: Currency) -> Result<()> {
        self.check_supply(agent, amount, currency)?;
        self.wallets
            .entry(agent)
            .or_insert_with(|| Wallet::new(agent))
            .add(amount, currency)
    }

    pub fn has_wallet(&self, agent: AgentId) -> bool {
        self.wallets.contains_key(&agent)
    }

    pub fn wallet(&self, agent: AgentId) -> Option<&Wallet> {
        self.wallets.get(&agent)
    }

    pub fn get_balance(&self, agent: AgentId, currency: Currency) -> Money {
        self.wallets
            .get(&agent)
            .map(|w| w.get_balance(currency))
            .unwrap_or_default()
    }

    pub fn journal(&self) -> &[Transaction] {
        &self.journal
    }

    /// Sum of every non-reserve wallet in `currency`.
    pub fn total_in_circulation(&self, currency: Currency) -> Money {
        self.wallets
            .values()
            .filter(|w| !self.reserve_accounts.contains(&w.owner))
            .map(|w| w.get_balance(currency))
            .sum()
    }

    /// Sum of every wallet in `currency`, reserves included.
    pub fn total_money(&self, currency: Currency) -> Money {
        self.wallets.values().map(|w| w.get_balance(currency)).sum()
    }

    /// Refuses new money that would take the total in `currency` past what a
    /// balance can represent.
    fn check_supply(&self, recipient: AgentId, amount: Money, currency: Currency) -> Result<()> {
        match self.total_money(currency).checked_add(amount) {
            Some(_) => Ok(()),
            None => Err(KernelError::BalanceOverflow {
                agent: recipient,
                currency,
                amount,
            }),
        }
    }

    /// Every non-zero balance, ordered by agent then currency.
    pub fn balances(&self) -> Vec<(AgentId, Currency, Money)> {
        let mut rows: Vec<(AgentId, Currency, Money)> = self
            .wallets
            .values()
            .flat_map(|w| {
                w.get_all_balances()
                    .iter()
                    .filter(|(_, amount)| !amount.is_zero())
                    .map(|(currency, amount)| (w.owner, *currency, *amount))
            })
            .collect();
        rows.sort();
        rows
    }

    /// Single all-or-nothing transfer. `None` means nothing moved.
    pub fn transfer(
        &mut self,
        debitor: AgentId,
        creditor: AgentId,
        amount: Money,
        memo: &str,
        tick: Tick,
        currency: Currency,
    ) -> Option<Transaction> {
        self.move_funds(
            debitor,
            creditor,
            amount,
            currency,
            memo,
            tick,
            TransactionKind::Transfer,
        )
    }

    /// Pays several creditors from one debitor, checking the debitor can cover
    /// the sum before touching anything.
    pub fn settle_atomic(
        &mut self,
        debitor: AgentId,
        legs: &[(AgentId, Money, &str)],
        tick: Tick,
    ) -> bool {
        let currency = self.currency;
        let Some(wallet) = self.wallets.get(&debitor) else {
            warn!(%debitor, "settle_atomic from unknown wallet");
            return false;
        };
        if let Some((creditor, _, _)) = legs.iter().find(|(c, _, _)| !self.wallets.contains_key(c)) {
            warn!(%debitor, %creditor, "settle_atomic to unknown wallet");
            return false;
        }
        let mut credited: HashMap<AgentId, Money> = HashMap::new();
        for (creditor, amount, _) in legs {
            let balance = *credited
                .entry(*creditor)
                .or_insert_with(|| self.get_balance(*creditor, currency));
            let Some(after) = balance.checked_add(*amount) else {
                warn!(%debitor, %creditor, %amount, "settle_atomic credit would overflow");
                return false;
            };
            credited.insert(*creditor, after);
        }

        let Some(total) = legs
            .iter()
            .try_fold(Money::ZERO, |sum, (_, amount, _)| sum.checked_add(*amount))
        else {
            warn!(%debitor, "settle_atomic legs exceed a representable sum");
            return false;
        };
        let available = wallet.get_balance(currency);
        if available < total {
            debug!(%debitor, required = %total, %available, "settle_atomic refused");
            return false;
        }

        for (creditor, amount, memo) in legs {
            let applied = self.move_funds(
                debitor,
                *creditor,
                *amount,
                currency,
                memo,
                tick,
                TransactionKind::SettlementLeg,
            );
            debug_assert!(applied.is_some(), "pre-validated leg must apply");
        }
        true
    }

    /// Applies a batch of legs atomically.
    ///
    /// Legs are validated in order against balances that already reflect the
    /// earlier legs of the same batch, so chains such as bank → buyer → seller
    /// close in one call. Either every leg applies or none does.
    pub fn execute_multiparty_settlement(&mut self, legs: &[SettlementLeg], tick: Tick) -> bool {
        self.settle_legs(legs, tick, TransactionKind::SettlementLeg)
    }

    pub(crate) fn settle_legs(
        &mut self,
        legs: &[SettlementLeg],
        tick: Tick,
        kind: TransactionKind,
    ) -> bool {
        let currency = self.currency;
        let mut projected: HashMap<AgentId, Money> = HashMap::new();

        for (position, leg) in legs.iter().enumerate() {
            let (Some(debit_wallet), Some(credit_wallet)) =
                (self.wallets.get(&leg.debit), self.wallets.get(&leg.credit))
            else {
                warn!(position, debit = %leg.debit, credit = %leg.credit, "settlement leg names unknown wallet");
                return false;
            };
            let debit_balance = *projected
                .entry(leg.debit)
                .or_insert_with(|| debit_wallet.get_balance(currency));
            let Some(after_debit) = debit_balance.checked_sub(leg.amount) else {
                debug!(
                    position,
                    debit = %leg.debit,
                    required = %leg.amount,
                    available = %debit_balance,
                    "settlement leg failed validation"
                );
                return false;
            };
            projected.insert(leg.debit, after_debit);
            let credit_balance = *projected
                .entry(leg.credit)
                .or_insert_with(|| credit_wallet.get_balance(currency));
            let Some(after_credit) = credit_balance.checked_add(leg.amount) else {
                warn!(position, credit = %leg.credit, amount = %leg.amount, "settlement leg credit would overflow");
                return false;
            };
            projected.insert(leg.credit, after_credit);
        }

        for leg in legs {
            let applied = self.move_funds(
                leg.debit, leg.credit, leg.amount, currency, &leg.memo, tick, kind,
            );
            debug_assert!(applied.is_some(), "pre-validated leg must apply");
        }
        true
    }

    /// Mints new money into `recipient`. Only the monetary authority may mint.
    pub fn create_and_transfer(
        &mut self,
        ledger: &mut MonetaryLedger,
        minter: AgentId,
        recipient: AgentId,
        amount: Money,
        memo: &str,
        tick: Tick,
    ) -> Result<Transaction> {
        if minter != self.authority {
            return Err(KernelError::Unauthorized { agent: minter });
        }
        let currency = self.currency;
        self.check_supply(recipient, amount, currency)?;
        let wallet = self
            .wallets
            .get_mut(&recipient)
            .ok_or(KernelError::UnknownAgent(recipient))?;
        wallet.add(amount, currency)?;

        if self.reserve_accounts.contains(&recipient) {
            ledger.record_reserve_injection(amount, memo);
        } else {
            ledger.record_credit_expansion(amount, None, None, memo);
        }
        info!(%recipient, %amount, memo, "money created");
        Ok(self.journal_entry(
            minter,
            recipient,
            amount,
            currency,
            memo,
            tick,
            TransactionKind::Mint,
        ))
    }

    /// Removes money from `source` and destroys it. Only the monetary
    /// authority may burn.
    pub fn transfer_and_destroy(
        &mut self,
        ledger: &mut MonetaryLedger,
        source: AgentId,
        burner: AgentId,
        amount: Money,
        memo: &str,
        tick: Tick,
    ) -> Result<Transaction> {
        if burner != self.authority {
            return Err(KernelError::Unauthorized { agent: burner });
        }
        let currency = self.currency;
        let wallet = self
            .wallets
            .get_mut(&source)
            .ok_or(KernelError::UnknownAgent(source))?;
        wallet.subtract(amount, currency)?;

        if self.reserve_accounts.contains(&source) {
            ledger.record_reserve_drain(amount, memo);
        } else {
            ledger.record_credit_destruction(amount, None, None, memo);
        }
        info!(%source, %amount, memo, "money destroyed");
        Ok(self.journal_entry(
            source,
            burner,
            amount,
            currency,
            memo,
            tick,
            TransactionKind::Burn,
        ))
    }

    /// Seizes up to `cash_cap` of the debtor's cash for the creditor and books
    /// the valued inventory and capital alongside it.
    pub fn record_liquidation(
        &mut self,
        debtor: AgentId,
        creditor: AgentId,
        cash_cap: Money,
        assets: AssetValuation,
        tick: Tick,
    ) -> LiquidationRecord {
        let currency = self.currency;
        let available = self.get_balance(debtor, currency);
        let seizable = available.min(cash_cap);
        let cash_seized = if seizable.is_zero() {
            Money::ZERO
        } else {
            self.move_funds(
                debtor,
                creditor,
                seizable,
                currency,
                "liquidation",
                tick,
                TransactionKind::Liquidation,
            )
            .map(|tx| tx.amount)
            .unwrap_or_default()
        };

        let record = LiquidationRecord {
            debtor,
            creditor,
            cash_seized,
            inventory_value: assets.inventory,
            capital_value: assets.capital,
            tick,
        };
        info!(
            %debtor,
            %creditor,
            cash = %record.cash_seized,
            inventory = %record.inventory_value,
            capital = %record.capital_value,
            "liquidation recorded"
        );
        record
    }

    /// Moves everything the deceased holds to the heir and closes the wallet.
    pub fn settle_estate(
        &mut self,
        deceased: AgentId,
        heir: AgentId,
        tick: Tick,
    ) -> Result<Vec<Transaction>> {
        if deceased == heir {
            return Err(KernelError::ValidationError(
                "An agent cannot inherit its own estate".to_string(),
            ));
        }
        if !self.wallets.contains_key(&heir) {
            return Err(KernelError::UnknownAgent(heir));
        }
        let estate = self
            .wallets
            .get(&deceased)
            .ok_or(KernelError::UnknownAgent(deceased))?;
        for (currency, amount) in estate.get_all_balances() {
            if self.get_balance(heir, *currency).checked_add(*amount).is_none() {
                return Err(KernelError::BalanceOverflow {
                    agent: heir,
                    currency: *currency,
                    amount: *amount,
                });
            }
        }
        let mut wallet = self
            .wallets
            .remove(&deceased)
            .ok_or(KernelError::UnknownAgent(deceased))?;
        self.reserve_accounts.remove(&deceased);

        let holdings: BTreeMap<Currency, Money> = wallet.drain();
        let mut transactions = Vec::with_capacity(holdings.len());
        for (currency, amount) in holdings {
            if amount.is_zero() {
                continue;
            }
            if let Some(heir_wallet) = self.wallets.get_mut(&heir) {
                heir_wallet.add(amount, currency)?;
            }
            transactions.push(self.journal_entry(
                deceased,
                heir,
                amount,
                currency,
                "estate settlement",
                tick,
                TransactionKind::Estate,
            ));
        }
        info!(%deceased, %heir, legs = transactions.len(), "estate settled");
        Ok(transactions)
    }

    #[allow(clippy::too_many_arguments)]
    fn move_funds(
        &mut self,
        debitor: AgentId,
        creditor: AgentId,
        amount: Money,
        currency: Currency,
        memo: &str,
        tick: Tick,
        kind: TransactionKind,
    ) -> Option<Transaction> {
        if !self.wallets.contains_key(&creditor) {
            warn!(%debitor, %creditor, "transfer to unknown wallet");
            return None;
        }
        if debitor != creditor
            && self.get_balance(creditor, currency).checked_add(amount).is_none()
        {
            warn!(%debitor, %creditor, %amount, memo, "transfer refused: credit would overflow");
            return None;
        }
        let debit_wallet = self.wallets.get_mut(&debitor)?;
        if let Err(e) = debit_wallet.subtract(amount, currency) {
            debug!(%debitor, %creditor, %amount, memo, "transfer refused: {}", e);
            return None;
        }
        self.wallets.get_mut(&creditor)?.add(amount, currency).ok()?;
        Some(self.journal_entry(debitor, creditor, amount, currency, memo, tick, kind))
    }

    #[allow(clippy::too_many_arguments)]
    fn journal_entry(
        &mut self,
        debit: AgentId,
        credit: AgentId,
        amount: Money,
        currency: Currency,
        memo: &str,
        tick: Tick,
        kind: TransactionKind,
    ) -> Transaction {
        let tx = Transaction {
            id: TransactionId(self.next_tx_id),
            debit,
            credit,
            amount,
            currency,
            memo: memo.to_string(),
            tick,
            kind,
        };
        self.next_tx_id += 1;
        self.journal.push(tx.clone());
        tx
    }
}
