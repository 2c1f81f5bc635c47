use uuid::Uuid;

use crate::config::BacktestConfig;
use crate::execution::{Broker, BrokerEvent};
use crate::models::{Candle, Direction, Fill, Order, OrderIntent, OrderStatus, Side};

struct QueuedOrder {
    order: Order,
    bars_waited: usize,
}

/// The broker's own record of the open position, used for trade-close
/// notifications
#[derive(Debug, Clone, Copy)]
struct OpenLot {
    direction: Direction,
    price: f64,
    size: f64,
    commission: f64,
}

/// Market-order broker for backtests.
///
/// Orders are acknowledged on submit and filled at the open of the next bar
/// (or `fill_delay_bars` bars later). Commission is a flat percentage of
/// notional. Entries whose notional exceeds the available cash are refused
/// with `MarginRejected`; cash is the initial balance plus realized net P&L.
pub struct SimulatedBroker {
    commission_pct: f64,
    fill_delay_bars: usize,
    cash: f64,
    last_close: Option<f64>,
    queue: Vec<QueuedOrder>,
    outbox: Vec<BrokerEvent>,
    lot: Option<OpenLot>,
    last_bar: Option<chrono::DateTime<chrono::Utc>>,
}

impl SimulatedBroker {
    pub fn new(config: &BacktestConfig) -> Self {
        Self {
            commission_pct: config.commission_pct,
            fill_delay_bars: config.fill_delay_bars,
            cash: config.initial_cash,
            last_close: None,
            queue: Vec::new(),
            outbox: Vec::new(),
            lot: None,
            last_bar: None,
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    fn status(&mut self, order_id: Uuid, status: OrderStatus) {
        let timestamp = self.last_bar.unwrap_or_else(chrono::Utc::now);
        self.outbox.push(BrokerEvent::OrderStatus {
            order_id,
            status,
            timestamp,
        });
    }

    fn execute(&mut self, order: &Order, candle: &Candle) -> Vec<BrokerEvent> {
        let price = candle.open;
        let commission = price * order.size * self.commission_pct;
        let mut events = vec![
            BrokerEvent::Filled(Fill {
                order_id: order.id,
                price,
                size: order.size,
                commission,
                timestamp: candle.timestamp,
            }),
            BrokerEvent::OrderStatus {
                order_id: order.id,
                status: OrderStatus::Completed,
                timestamp: candle.timestamp,
            },
        ];

        match (order.intent, self.lot.take()) {
            (OrderIntent::Entry, None) => {
                let direction = match order.side {
                    Side::Buy => Direction::Long,
                    Side::Sell => Direction::Short,
                };
                self.lot = Some(OpenLot {
                    direction,
                    price,
                    size: order.size,
                    commission,
                });
            }
            (OrderIntent::Exit, Some(lot)) => {
                let pnl = (price - lot.price) * lot.size * lot.direction.sign();
                let pnl_with_commission = pnl - lot.commission - commission;
                self.cash += pnl_with_commission;
                events.push(BrokerEvent::TradeClosed {
                    order_id: order.id,
                    pnl,
                    pnl_with_commission,
                    timestamp: candle.timestamp,
                });
            }
            (intent, lot) => {
                tracing::warn!("Broker executed {:?} order {} against lot {:?}", intent, order.id, lot);
                self.lot = lot;
            }
        }

        tracing::debug!(
            "Filled {} {:.4} @ {:.4} (commission {:.4})",
            order.side,
            order.size,
            price,
            commission
        );

        events
    }
}

impl Broker for SimulatedBroker {
    fn submit(&mut self, order: &Order) -> Uuid {
        if order.intent == OrderIntent::Entry {
            if let Some(price) = self.last_close {
                let notional = price * order.size;
                if notional > self.cash {
                    tracing::warn!(
                        "Refusing order {}: notional {:.2} exceeds cash {:.2}",
                        order.id,
                        notional,
                        self.cash
                    );
                    self.status(order.id, OrderStatus::MarginRejected);
                    return order.id;
                }
            }
        }

        self.status(order.id, OrderStatus::Accepted);
        self.queue.push(QueuedOrder {
            order: order.clone(),
            bars_waited: 0,
        });
        order.id
    }

    fn on_bar(&mut self, candle: &Candle) -> Vec<BrokerEvent> {
        let mut events = self.drain_events();

        let mut waiting = Vec::with_capacity(self.queue.len());
        for mut queued in std::mem::take(&mut self.queue) {
            if queued.bars_waited >= self.fill_delay_bars {
                events.extend(self.execute(&queued.order, candle));
            } else {
                queued.bars_waited += 1;
                waiting.push(queued);
            }
        }
        self.queue = waiting;

        self.last_close = Some(candle.close);
        self.last_bar = Some(candle.timestamp);
        events
    }

    fn drain_events(&mut self) -> Vec<BrokerEvent> {
        std::mem::take(&mut self.outbox)
    }

    fn open_orders(&self) -> usize {
        self.queue.len()
    }
}
