pub mod stock_lstm;
