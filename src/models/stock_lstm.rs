use candle_core::{Module, Result, Tensor};
use candle_nn::{LSTMConfig, Linear, VarBuilder, LSTM, RNN};

/// Stacked LSTM with a linear head on the last time step.
///
/// Parameter names follow the PyTorch `nn.LSTM` + `nn.Linear` state-dict
/// layout (`lstm.weight_ih_l0`, ..., `fc.weight`, `fc.bias`), so weights
/// exported from the training notebook load as-is.
pub struct StockLstm {
    lstm_layers: Vec<LSTM>,
    fc: Linear,
}

impl StockLstm {
    pub fn new(input_dim: usize, hidden_dim: usize, num_layers: usize, vb: VarBuilder) -> Result<Self> {
        if num_layers == 0 {
            return Err(candle_core::Error::Msg("StockLstm needs at least one layer".into()));
        }
        let mut lstm_layers = Vec::with_capacity(num_layers);
        for i in 0..num_layers {
            let in_dim = if i == 0 { input_dim } else { hidden_dim };
            let cfg = LSTMConfig {
                layer_idx: i,
                ..Default::default()
            };
            lstm_layers.push(candle_nn::lstm(in_dim, hidden_dim, cfg, vb.pp("lstm"))?);
        }
        let fc = candle_nn::linear(hidden_dim, 1, vb.pp("fc"))?;
        Ok(Self { lstm_layers, fc })
    }

    /// x: [batch, seq_len, input_dim] -> [batch, 1]
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let mut current_input = x.clone();
        let num_layers = self.lstm_layers.len();
        let mut last_h = None;

        for (i, lstm) in self.lstm_layers.iter().enumerate() {
            let states = lstm.seq(&current_input)?;
            last_h = Some(
                states
                    .last()
                    .ok_or_else(|| candle_core::Error::Msg("Empty LSTM sequence".into()))?
                    .h
                    .clone(),
            );

            if i < num_layers - 1 {
                let hidden_seq: Vec<Tensor> = states.iter().map(|s| s.h.clone()).collect();
                current_input = Tensor::stack(&hidden_seq, 1)?;
            }
        }

        let h_t = last_h.ok_or_else(|| candle_core::Error::Msg("No LSTM layers".into()))?;
        self.fc.forward(&h_t)
    }
}

impl Module for StockLstm {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        StockLstm::forward(self, xs)
    }
}
