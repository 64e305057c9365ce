//! Macros for declaring story owners.
//!
//! - `storied!`: implement [`Storied`](crate::Storied) for a type by listing
//!   the methods and fields its stories may name

/// Implement [`Storied`](crate::Storied) for an owner type.
///
/// Every section is optional, but present sections must come in this order:
///
/// - `steps`: methods `fn(&self, &Context) -> StepResult`
/// - `coroutines`: methods `async fn(&self, &Context) -> StepResult`
/// - `stories`: associated functions returning a story definition
///   (`Story` or `Result<Story, StoryError>`), compiled as substories
/// - `injected`: fields holding an already mounted story
///
/// ```
/// use fabula::{storied, Context, Outcome, StepResult, Story, StoryError};
///
/// struct Greeter;
///
/// impl Greeter {
///     fn hello() -> Result<Story, StoryError> {
///         Story::define("Greeter", "hello").argument("name").step("greet").build()
///     }
///
///     fn greet(&self, ctx: &Context) -> StepResult {
///         let name: String = ctx.get_as("name")?;
///         Ok(Outcome::result(format!("hello {name}")))
///     }
/// }
///
/// storied! {
///     Greeter {
///         steps: [greet],
///         stories: [hello],
///     }
/// }
///
/// let greeter = std::sync::Arc::new(Greeter);
/// let hello = Greeter::hello().and_then(|story| story.mount(greeter)).unwrap();
/// assert_eq!(hello.call([("name", "world")]).unwrap(), "hello world");
/// ```
#[macro_export]
macro_rules! storied {
    (
        $owner:ident {
            $(steps: [$($step:ident),* $(,)?] $(,)?)?
            $(coroutines: [$($coroutine:ident),* $(,)?] $(,)?)?
            $(stories: [$($story:ident),* $(,)?] $(,)?)?
            $(injected: [$($injected:ident),* $(,)?] $(,)?)?
        }
    ) => {
        impl $crate::Storied for $owner {
            fn class_name(&self) -> &str {
                stringify!($owner)
            }

            #[allow(unused_variables)]
            fn member(self: ::std::sync::Arc<Self>, name: &str) -> Option<$crate::Member> {
                $($(
                    if name == stringify!($step) {
                        let this = ::std::sync::Arc::clone(&self);
                        return Some($crate::Member::step(name, move |ctx: &$crate::Context| {
                            this.$step(ctx)
                        }));
                    }
                )*)?

                $($(
                    if name == stringify!($coroutine) {
                        $crate::paste::paste! {
                            struct [<$owner $coroutine:camel>](::std::sync::Arc<$owner>);

                            #[$crate::async_trait::async_trait]
                            impl $crate::Coroutine for [<$owner $coroutine:camel>] {
                                async fn call(&self, ctx: &$crate::Context) -> $crate::StepResult {
                                    self.0.$coroutine(ctx).await
                                }
                            }

                            return Some($crate::Member::coroutine(
                                name,
                                [<$owner $coroutine:camel>](::std::sync::Arc::clone(&self)),
                            ));
                        }
                    }
                )*)?

                $($(
                    if name == stringify!($story) {
                        return Some($crate::Member::story(
                            $owner::$story(),
                            ::std::sync::Arc::clone(&self),
                        ));
                    }
                )*)?

                $($(
                    if name == stringify!($injected) {
                        return Some($crate::Member::mounted(self.$injected.clone()));
                    }
                )*)?

                None
            }
        }
    };
}
