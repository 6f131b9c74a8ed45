#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Relu,
    Tanh,
    Sigmoid,
    None,
    LeakyRelu,
}

impl Activation {
    pub fn from_raw(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Relu),
            1 => Some(Self::Tanh),
            2 => Some(Self::Sigmoid),
            3 => Some(Self::None),
            4 => Some(Self::LeakyRelu),
            _ => None,
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            Self::Relu => 0,
            Self::Tanh => 1,
            Self::Sigmoid => 2,
            Self::None => 3,
            Self::LeakyRelu => 4,
        }
    }

    pub fn apply(self, x: f32) -> f32 {
        match self {
            Self::Relu => x.max(0.0),
            Self::Tanh => 2.0 / (1.0 + (-2.0 * x).exp()) - 1.0,
            Self::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Self::None => x,
            Self::LeakyRelu => {
                if x > 0.0 {
                    x
                } else {
                    0.2 * x
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaddingMethod {
    Valid,
    Same,
    SameClampToEdge,
}

impl PaddingMethod {
    pub fn from_raw(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Valid),
            1 => Some(Self::Same),
            2 => Some(Self::SameClampToEdge),
            _ => None,
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            Self::Valid => 0,
            Self::Same => 1,
            Self::SameClampToEdge => 2,
        }
    }
}
