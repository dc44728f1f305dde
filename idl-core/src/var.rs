#![forbid(unsafe_code)]

use crate::error::IdlError;
use crate::types::Type;
use crate::value::Value;

/// Binds a variable to a template parameter position of one function.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TemplateBinding {
    pub index: usize,
    pub function_name: String,
}

/// A named, typed variable, optionally with a statically known value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Var {
    name: String,
    ty: Type,
    value: Option<Value>,
    decode_var: bool,
    param: bool,
    template: Option<TemplateBinding>,
}

impl Var {
    pub fn new(name: impl Into<String>, ty: Type, value: Option<Value>) -> Self {
        Self {
            name: name.into(),
            ty,
            value,
            decode_var: false,
            param: false,
            template: None,
        }
    }

    /// An architecture parameter.
    pub fn param(name: impl Into<String>, ty: Type, value: Option<Value>) -> Self {
        Self {
            param: true,
            ..Self::new(name, ty, value)
        }
    }

    /// An instruction encoding field such as `rs1`; never statically known.
    pub fn decode(name: impl Into<String>, ty: Type) -> Self {
        Self {
            decode_var: true,
            ..Self::new(name, ty, None)
        }
    }

    /// The value of template parameter `index` of `function_name`.
    pub fn template_arg(
        name: impl Into<String>,
        ty: Type,
        value: Option<Value>,
        index: usize,
        function_name: impl Into<String>,
    ) -> Self {
        Self {
            template: Some(TemplateBinding {
                index,
                function_name: function_name.into(),
            }),
            ..Self::new(name, ty.make_const().make_template_var(), value)
        }
    }

    /// Attaches a template binding from optional parts, which must be given
    /// together.
    pub fn with_template(
        mut self,
        index: Option<usize>,
        function_name: Option<String>,
    ) -> Result<Self, IdlError> {
        self.template = match (index, function_name) {
            (Some(index), Some(function_name)) => {
                self.ty = self.ty.make_template_var();
                Some(TemplateBinding {
                    index,
                    function_name,
                })
            }
            (None, None) => None,
            _ => {
                return Err(IdlError::MalformedTemplateBinding {
                    name: self.name.clone(),
                });
            }
        };
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn is_const(&self) -> bool {
        self.ty.is_const()
    }

    pub fn is_decode_var(&self) -> bool {
        self.decode_var
    }

    pub fn is_param(&self) -> bool {
        self.param
    }

    pub fn template(&self) -> Option<&TemplateBinding> {
        self.template.as_ref()
    }

    /// The value bound for `function_name`, if this is one of its template
    /// arguments.
    pub fn template_value_for(&self, function_name: &str) -> Option<&Value> {
        match &self.template {
            Some(binding) if binding.function_name == function_name => self.value.as_ref(),
            _ => None,
        }
    }

    pub(crate) fn set_value(&mut self, value: Option<Value>) {
        self.value = value;
    }
}
